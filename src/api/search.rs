use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;

use super::{query_params, AppState};
use crate::error::Result;
use crate::models::Listing;
use crate::query::{SearchParams, SearchQuery};

/// `GET /search?query=`
pub async fn search(
    State(state): State<AppState>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<Listing>>> {
    let query = SearchQuery::from_params(&query_params(params)?)?;
    Ok(Json(state.store.search_listings(&query).await?))
}
