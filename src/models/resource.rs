//! Represents a blob uploaded to Feishu and the metadata we keep about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Which remote storage call produced the resource.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Image,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::File => "file",
            ResourceType::Image => "image",
        }
    }

    /// Name of the key field Feishu uses for this kind (`file_key` / `image_key`).
    pub fn key_field(self) -> &'static str {
        match self {
            ResourceType::File => "file_key",
            ResourceType::Image => "image_key",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of `file_metadata`.
///
/// Rows are written once, right after the remote upload succeeded, and never
/// updated afterwards.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadedResource {
    /// Local autoincrement id.
    pub id: i64,

    pub resource_type: ResourceType,

    /// Key assigned by Feishu (`file_key` or `image_key`).
    pub resource_key: String,

    /// Filename as sent by the client. Untrusted.
    pub original_name: Option<String>,

    /// Length of the payload that was hashed and uploaded.
    pub file_size: Option<i64>,

    pub md5_hash: Option<String>,

    pub sha256_hash: Option<String>,

    pub upload_time: DateTime<Utc>,

    /// Uploader id declared by the client, if any.
    pub upload_user_id: Option<String>,

    /// Serialized `data` object of the Feishu response.
    pub feishu_api_response: Option<String>,
}

/// Values for a fresh `file_metadata` insert.
#[derive(Clone, Debug)]
pub struct NewResource {
    pub resource_type: ResourceType,
    pub resource_key: String,
    pub original_name: String,
    pub file_size: i64,
    pub md5_hash: String,
    pub sha256_hash: String,
    pub upload_time: DateTime<Utc>,
    pub upload_user_id: Option<String>,
    pub feishu_api_response: String,
}
