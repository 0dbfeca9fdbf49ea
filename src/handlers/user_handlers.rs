//! User lookup by phone number.
//!
//! Searches are not recorded.

use crate::{
    errors::AppError,
    models::feishu::UserInfo,
    state::AppState,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SearchUserReq {
    #[serde(default)]
    pub phone_number: String,
}

/// `POST /api/users/search`
pub async fn search_user(
    State(state): State<AppState>,
    payload: Result<Json<SearchUserReq>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let phone = req.phone_number.trim();
    if phone.is_empty() {
        return Err(AppError::bad_request("phone_number is required"));
    }

    let users: Vec<UserInfo> = state
        .messenger
        .batch_get_user_ids(vec![phone.to_string()], Vec::new(), false)
        .await?
        .into_iter()
        .map(UserInfo::from)
        .collect();

    info!(count = users.len(), "user search completed");
    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "data": users,
    })))
}
