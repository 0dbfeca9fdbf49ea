//! Capabilities the gateway consumes from the messaging platform.
//!
//! Handlers and the ingestion pipeline only see these traits, so they can be
//! exercised against stubs without network access. `FeishuClient` is the
//! production implementation.

use crate::models::feishu::{
    FileCategory, MessageType, ReceiveIdType, SentMessage, UploadReceipt, UserContact,
};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to feishu failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feishu returned code={code}, msg={msg}")]
    Api { code: i64, msg: String },
    #[error("could not obtain tenant access token: {0}")]
    Auth(String),
    #[error("unexpected feishu response: {0}")]
    Decode(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Transport of payloads to the remote platform.
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    /// Upload a generic file. `duration_ms` only matters for `opus`/`mp4`.
    async fn upload_file(
        &self,
        category: FileCategory,
        filename: &str,
        payload: Bytes,
        duration_ms: Option<u32>,
    ) -> RemoteResult<UploadReceipt>;

    /// Upload an image meant to be sent in messages.
    async fn upload_image(&self, payload: Bytes) -> RemoteResult<UploadReceipt>;
}

/// Messaging and directory lookups.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// `content` is the JSON-encoded message body, e.g. `{"text":"hi"}`.
    async fn send_message(
        &self,
        receive_id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: MessageType,
        content: String,
    ) -> RemoteResult<SentMessage>;

    async fn batch_get_user_ids(
        &self,
        mobiles: Vec<String>,
        emails: Vec<String>,
        include_resigned: bool,
    ) -> RemoteResult<Vec<UserContact>>;
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How the stub uploader answers.
    #[derive(Clone, Debug)]
    pub enum StubOutcome {
        /// Hand out `<prefix>-<n>` keys.
        Keys(&'static str),
        /// Succeed without a key.
        EmptyKey,
        Fail,
    }

    #[derive(Clone, Debug)]
    pub struct RecordedUpload {
        pub category: Option<FileCategory>,
        pub filename: Option<String>,
        pub payload: Bytes,
    }

    pub struct StubUploader {
        outcome: StubOutcome,
        calls: AtomicUsize,
        pub uploads: Mutex<Vec<RecordedUpload>>,
    }

    impl StubUploader {
        pub fn new(outcome: StubOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                uploads: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer(&self, field: &str, upload: RecordedUpload) -> RemoteResult<UploadReceipt> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.uploads.lock().unwrap().push(upload);
            match self.outcome {
                StubOutcome::Keys(prefix) => {
                    let key = format!("{}-{}", prefix, n);
                    Ok(UploadReceipt {
                        resource_key: Some(key.clone()),
                        raw: raw_data(field, &key),
                    })
                }
                StubOutcome::EmptyKey => Ok(UploadReceipt {
                    resource_key: Some(String::new()),
                    raw: raw_data(field, ""),
                }),
                StubOutcome::Fail => Err(RemoteError::Api {
                    code: 234001,
                    msg: "Invalid request param.".into(),
                }),
            }
        }
    }

    fn raw_data(field: &str, key: &str) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert(field.to_string(), serde_json::Value::String(key.to_string()));
        serde_json::Value::Object(data)
    }

    #[async_trait]
    impl RemoteUploader for StubUploader {
        async fn upload_file(
            &self,
            category: FileCategory,
            filename: &str,
            payload: Bytes,
            _duration_ms: Option<u32>,
        ) -> RemoteResult<UploadReceipt> {
            self.answer(
                "file_key",
                RecordedUpload {
                    category: Some(category),
                    filename: Some(filename.to_string()),
                    payload,
                },
            )
        }

        async fn upload_image(&self, payload: Bytes) -> RemoteResult<UploadReceipt> {
            self.answer(
                "image_key",
                RecordedUpload {
                    category: None,
                    filename: None,
                    payload,
                },
            )
        }
    }

    #[derive(Clone, Debug)]
    pub struct SentRecord {
        pub receive_id_type: ReceiveIdType,
        pub receive_id: String,
        pub msg_type: MessageType,
        pub content: String,
    }

    #[derive(Default)]
    pub struct StubMessenger {
        pub sent: Mutex<Vec<SentRecord>>,
        pub users: Vec<UserContact>,
        pub fail: bool,
    }

    #[async_trait]
    impl Messenger for StubMessenger {
        async fn send_message(
            &self,
            receive_id_type: ReceiveIdType,
            receive_id: &str,
            msg_type: MessageType,
            content: String,
        ) -> RemoteResult<SentMessage> {
            if self.fail {
                return Err(RemoteError::Api {
                    code: 230001,
                    msg: "invalid receive_id".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentRecord {
                receive_id_type,
                receive_id: receive_id.to_string(),
                msg_type,
                content,
            });
            Ok(SentMessage {
                message_id: Some(format!("om_{}", sent.len())),
                chat_id: Some("oc_stub".into()),
                msg_type: Some(msg_type.as_str().into()),
                create_time: None,
            })
        }

        async fn batch_get_user_ids(
            &self,
            _mobiles: Vec<String>,
            _emails: Vec<String>,
            _include_resigned: bool,
        ) -> RemoteResult<Vec<UserContact>> {
            if self.fail {
                return Err(RemoteError::Auth("app credentials rejected".into()));
            }
            Ok(self.users.clone())
        }
    }
}
