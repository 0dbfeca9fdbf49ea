//! Wire types for the Feishu open platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard `{code, msg, data}` envelope returned by every open-api call.
#[derive(Deserialize, Debug)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// Response of `auth/v3/tenant_access_token/internal`. Unlike the other
/// endpoints the token sits at the top level instead of under `data`.
#[derive(Deserialize, Debug)]
pub struct TenantTokenResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub tenant_access_token: Option<String>,
    /// Lifetime in seconds.
    pub expire: Option<u64>,
}

/// `file_type` accepted by `im/v1/files`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Opus,
    Mp4,
    Pdf,
    Doc,
    Xls,
    Ppt,
    Stream,
}

impl FileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Opus => "opus",
            FileCategory::Mp4 => "mp4",
            FileCategory::Pdf => "pdf",
            FileCategory::Doc => "doc",
            FileCategory::Xls => "xls",
            FileCategory::Ppt => "ppt",
            FileCategory::Stream => "stream",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `receive_id` should be interpreted by `im/v1/messages`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveIdType {
    OpenId,
    UserId,
    UnionId,
    Email,
    ChatId,
}

impl ReceiveIdType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiveIdType::OpenId => "open_id",
            ReceiveIdType::UserId => "user_id",
            ReceiveIdType::UnionId => "union_id",
            ReceiveIdType::Email => "email",
            ReceiveIdType::ChatId => "chat_id",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

/// Outcome of an upload call: the key if Feishu returned one, plus the raw
/// `data` object kept for auditing.
#[derive(Clone, Debug)]
pub struct UploadReceipt {
    pub resource_key: Option<String>,
    pub raw: serde_json::Value,
}

/// Subset of the `im/v1/messages` response we pass back to callers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SentMessage {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

/// One entry of `contact/v3/users/batch_get_id` → `data.user_list`.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct UserContact {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BatchGetIdData {
    #[serde(default)]
    pub user_list: Vec<UserContact>,
}

/// User as exposed by `/api/users/search`. Missing values become empty strings.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub user_id: String,
    pub mobile: String,
    pub email: String,
}

impl From<UserContact> for UserInfo {
    fn from(contact: UserContact) -> Self {
        Self {
            user_id: contact.user_id.unwrap_or_default(),
            mobile: contact.mobile.unwrap_or_default(),
            email: contact.email.unwrap_or_default(),
        }
    }
}
