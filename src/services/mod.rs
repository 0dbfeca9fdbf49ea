//! Core services: the upload pipeline, the metadata table, and the
//! Feishu-facing capabilities.

pub mod feishu_client;
pub mod ingest;
pub mod metadata_store;
pub mod remote;
