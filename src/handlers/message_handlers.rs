//! HTTP handlers that send Feishu messages (text, image, file).

use crate::{
    errors::AppError,
    models::feishu::{MessageType, ReceiveIdType, SentMessage},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct SendMessageReq {
    pub receive_id_type: ReceiveIdType,
    pub receive_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendImageMessageReq {
    pub receive_id_type: ReceiveIdType,
    pub receive_id: String,
    pub image_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SendFileMessageReq {
    pub receive_id_type: ReceiveIdType,
    pub receive_id: String,
    pub file_key: String,
}

/// Text push addressed by `user_id`.
#[derive(Debug, Deserialize)]
pub struct SimpleMessageReq {
    #[serde(default)]
    pub userid: String,
    #[serde(default)]
    pub msg: String,
}

/// Empty strings count as missing.
fn require<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", field)));
    }
    Ok(trimmed)
}

async fn dispatch(
    state: &AppState,
    receive_id_type: ReceiveIdType,
    receive_id: &str,
    msg_type: MessageType,
    content: Value,
) -> Result<SentMessage, AppError> {
    let sent = state
        .messenger
        .send_message(receive_id_type, receive_id, msg_type, content.to_string())
        .await
        .inspect_err(|err| {
            error!(
                receive_id_type = receive_id_type.as_str(),
                receive_id,
                "sending {} message failed: {}",
                msg_type.as_str(),
                err
            )
        })?;
    info!(
        message_id = sent.message_id.as_deref().unwrap_or_default(),
        "sent {} message",
        msg_type.as_str()
    );
    Ok(sent)
}

/// `POST /api/messages/send`
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageReq>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let receive_id = require(&req.receive_id, "receive_id")?;
    require(&req.content, "content")?;

    let sent = dispatch(
        &state,
        req.receive_id_type,
        receive_id,
        MessageType::Text,
        json!({ "text": req.content }),
    )
    .await?;

    Ok(Json(json!({ "success": true, "data": sent })))
}

/// `POST /api/messages/send-image`
pub async fn send_image_message(
    State(state): State<AppState>,
    payload: Result<Json<SendImageMessageReq>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let receive_id = require(&req.receive_id, "receive_id")?;
    let image_key = require(&req.image_key, "image_key")?;

    let sent = dispatch(
        &state,
        req.receive_id_type,
        receive_id,
        MessageType::Image,
        json!({ "image_key": image_key }),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "message_id": sent.message_id.unwrap_or_default() },
    })))
}

/// `POST /api/messages/send-file`
pub async fn send_file_message(
    State(state): State<AppState>,
    payload: Result<Json<SendFileMessageReq>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let receive_id = require(&req.receive_id, "receive_id")?;
    let file_key = require(&req.file_key, "file_key")?;

    let sent = dispatch(
        &state,
        req.receive_id_type,
        receive_id,
        MessageType::File,
        json!({ "file_key": file_key }),
    )
    .await?;

    Ok(Json(json!({ "success": true, "data": sent })))
}

/// `GET /api/messages/send-simple?userid=&msg=`
pub async fn send_simple_get(
    State(state): State<AppState>,
    query: Result<Query<SimpleMessageReq>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(req) = query?;
    send_simple(&state, req).await
}

/// `POST /api/messages/send-simple` with `{userid, msg}`.
pub async fn send_simple_post(
    State(state): State<AppState>,
    payload: Result<Json<SimpleMessageReq>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    send_simple(&state, req).await
}

async fn send_simple(state: &AppState, req: SimpleMessageReq) -> Result<Json<Value>, AppError> {
    let userid = require(&req.userid, "userid")?;
    if req.msg.trim().is_empty() {
        return Err(AppError::bad_request("msg is required"));
    }

    let sent = dispatch(
        state,
        ReceiveIdType::UserId,
        userid,
        MessageType::Text,
        json!({ "text": req.msg }),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": sent,
        "message": "message sent",
    })))
}
