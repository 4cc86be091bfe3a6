use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::{json_body, message, query_params, AppState, AuthUser};
use crate::error::Result;
use crate::models::Favorite;
use crate::validation::{validate_favorite, FavoriteRequest};

pub async fn list_favorites(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Favorite>>> {
    Ok(Json(state.store.list_favorites(&caller).await?))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: std::result::Result<Json<FavoriteRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let listing_id = validate_favorite(&json_body(payload)?)?;
    let favorite = state.store.add_favorite(listing_id, &caller).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

/// `DELETE /favorites?listing_id=`
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    params: std::result::Result<Query<FavoriteRequest>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let listing_id = validate_favorite(&query_params(params)?)?;
    state.store.remove_favorite(listing_id, &caller).await?;
    Ok(message("Favorite removed successfully"))
}
