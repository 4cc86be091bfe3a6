use axum::extract::{Path, State};
use axum::Json;

use super::AppState;
use crate::error::{Error, Result};
use crate::models::Category;

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.store.list_categories().await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>> {
    state
        .store
        .get_category_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("Category not found"))
}
