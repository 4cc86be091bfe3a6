use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use super::{json_body, AppState, AuthUser};
use crate::error::{Error, Result};
use crate::models::Profile;
use crate::validation::{validate_profile_changes, UpdateProfileRequest};

pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Profile>> {
    state
        .store
        .get_profile(&caller)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("Profile not found"))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: std::result::Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>> {
    let changes = validate_profile_changes(json_body(payload)?, Utc::now())?;
    Ok(Json(state.store.update_profile(changes, &caller).await?))
}
