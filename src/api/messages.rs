use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use super::{json_body, query_params, AppState, AuthUser};
use crate::error::Result;
use crate::models::Message;
use crate::validation::{parse_uuid, validate_new_message, CreateMessageRequest};

#[derive(Debug, Default, Deserialize)]
pub struct MessageFilter {
    pub listing_id: Option<String>,
}

/// `GET /messages[?listing_id=]`: conversations the caller takes part in
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    params: std::result::Result<Query<MessageFilter>, QueryRejection>,
) -> Result<Json<Vec<Message>>> {
    let filter = query_params(params)?;
    let listing_id = match filter.listing_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Some(parse_uuid("listing_id", id)?),
        _ => None,
    };
    Ok(Json(state.store.list_messages(listing_id, &caller).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: std::result::Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let message = validate_new_message(json_body(payload)?, caller.user_id)?;
    let sent = state.store.create_message(message, &caller).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}
