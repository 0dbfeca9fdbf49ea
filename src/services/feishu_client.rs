//! src/services/feishu_client.rs
//!
//! FeishuClient: `reqwest` implementation of [`RemoteUploader`] and
//! [`Messenger`] against the Feishu open platform.
//!
//! Every call needs a tenant access token. The token is fetched lazily,
//! cached until shortly before it expires, and refreshed under a mutex so
//! concurrent requests share a single refresh.

use crate::{
    models::feishu::{
        ApiEnvelope, BatchGetIdData, FileCategory, MessageType, ReceiveIdType, SentMessage,
        TenantTokenResponse, UploadReceipt, UserContact,
    },
    services::remote::{Messenger, RemoteError, RemoteResult, RemoteUploader},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";

/// Refresh this long before the advertised expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct FeishuCredentials {
    pub app_id: String,
    pub app_secret: String,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct FeishuClient {
    http: Client,
    base_url: String,
    credentials: FeishuCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl FeishuClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        credentials: FeishuCredentials,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Return a valid tenant access token, fetching a new one if needed.
    async fn tenant_token(&self) -> RemoteResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!("requesting tenant access token");
        let resp: TenantTokenResponse = self
            .http
            .post(self.url("/open-apis/auth/v3/tenant_access_token/internal"))
            .json(&json!({
                "app_id": self.credentials.app_id,
                "app_secret": self.credentials.app_secret,
            }))
            .send()
            .await?
            .json()
            .await?;

        if resp.code != 0 {
            return Err(RemoteError::Auth(format!(
                "code={}, msg={}",
                resp.code, resp.msg
            )));
        }
        let value = resp
            .tenant_access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RemoteError::Auth("response carried no token".into()))?;
        let lifetime = Duration::from_secs(resp.expire.unwrap_or(0));
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);

        info!(expires_in = lifetime.as_secs(), "obtained tenant access token");
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at,
        });
        Ok(value)
    }

    /// Authorize, send, and unwrap the `{code, msg, data}` envelope.
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> RemoteResult<Option<T>> {
        let token = self.tenant_token().await?;
        let resp = req.bearer_auth(token).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let envelope: ApiEnvelope<T> = serde_json::from_slice(&body).map_err(|err| {
            RemoteError::Decode(format!("http {}: {}", status.as_u16(), err))
        })?;
        if envelope.code != 0 {
            return Err(RemoteError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data)
    }

    async fn upload(&self, path: &str, form: Form, key_field: &str) -> RemoteResult<UploadReceipt> {
        let data: Option<Value> = self.call(self.http.post(self.url(path)).multipart(form)).await?;
        let raw = data.unwrap_or(Value::Null);
        let resource_key = raw
            .get(key_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(UploadReceipt { resource_key, raw })
    }
}

#[async_trait]
impl RemoteUploader for FeishuClient {
    async fn upload_file(
        &self,
        category: FileCategory,
        filename: &str,
        payload: Bytes,
        duration_ms: Option<u32>,
    ) -> RemoteResult<UploadReceipt> {
        debug!(%category, filename, size = payload.len(), "uploading file to feishu");
        let mut form = Form::new()
            .text("file_type", category.as_str())
            .text("file_name", filename.to_string());
        if let Some(ms) = duration_ms {
            form = form.text("duration", ms.to_string());
        }
        let part = Part::stream(payload).file_name(filename.to_string());
        form = form.part("file", part);

        self.upload("/open-apis/im/v1/files", form, "file_key").await
    }

    async fn upload_image(&self, payload: Bytes) -> RemoteResult<UploadReceipt> {
        debug!(size = payload.len(), "uploading image to feishu");
        let form = Form::new()
            .text("image_type", "message")
            .part("image", Part::stream(payload).file_name("image"));

        self.upload("/open-apis/im/v1/images", form, "image_key")
            .await
    }
}

#[async_trait]
impl Messenger for FeishuClient {
    async fn send_message(
        &self,
        receive_id_type: ReceiveIdType,
        receive_id: &str,
        msg_type: MessageType,
        content: String,
    ) -> RemoteResult<SentMessage> {
        debug!(
            receive_id_type = receive_id_type.as_str(),
            receive_id,
            msg_type = msg_type.as_str(),
            "sending feishu message"
        );
        let req = self
            .http
            .post(self.url("/open-apis/im/v1/messages"))
            .query(&[("receive_id_type", receive_id_type.as_str())])
            .json(&json!({
                "receive_id": receive_id,
                "msg_type": msg_type.as_str(),
                "content": content,
            }));

        self.call::<SentMessage>(req)
            .await?
            .ok_or_else(|| RemoteError::Decode("message response carried no data".into()))
    }

    async fn batch_get_user_ids(
        &self,
        mobiles: Vec<String>,
        emails: Vec<String>,
        include_resigned: bool,
    ) -> RemoteResult<Vec<UserContact>> {
        let req = self
            .http
            .post(self.url("/open-apis/contact/v3/users/batch_get_id"))
            .query(&[("user_id_type", "user_id")])
            .json(&json!({
                "mobiles": mobiles,
                "emails": emails,
                "include_resigned": include_resigned,
            }));

        let data: Option<BatchGetIdData> = self.call(req).await?;
        Ok(data.map(|d| d.user_list).unwrap_or_default())
    }
}
