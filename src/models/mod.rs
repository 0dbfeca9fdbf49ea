//! Data models for the gateway.
//!
//! `resource` maps the local `file_metadata` table via `sqlx::FromRow`;
//! `feishu` holds the wire shapes exchanged with the Feishu open platform.

pub mod feishu;
pub mod resource;
