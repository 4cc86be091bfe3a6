use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{json_body, message, query_params, AppState, AuthUser, MaybeUser};
use crate::error::{Error, Result};
use crate::models::Listing;
use crate::query::{ListingFilters, ListingQuery};
use crate::validation::{
    validate_listing_changes, validate_new_listing, CreateListingRequest, UpdateListingRequest,
};

/// `GET /listings`
pub async fn list_listings(
    State(state): State<AppState>,
    filters: std::result::Result<Query<ListingFilters>, QueryRejection>,
) -> Result<Json<Vec<Listing>>> {
    let filters = query_params(filters)?;
    let query = ListingQuery::from_filters(&filters, &state.config.query_limits())?;
    debug!(?query, "listing listings");
    Ok(Json(state.store.list_listings(&query).await?))
}

/// `GET /listings/mine`: the caller's listings in every status
pub async fn my_listings(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    filters: std::result::Result<Query<ListingFilters>, QueryRejection>,
) -> Result<Json<Vec<Listing>>> {
    let filters = query_params(filters)?;
    let query = ListingQuery::from_filters(&filters, &state.config.query_limits())?
        .owned_by(caller.user_id);
    Ok(Json(state.store.list_listings(&query).await?))
}

/// `POST /listings`: anonymous submissions are accepted
pub async fn create_listing(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    payload: std::result::Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let request = json_body(payload)?;
    let listing = validate_new_listing(
        request,
        caller.as_ref().map(|c| c.user_id),
        Utc::now(),
        state.config.listing_ttl_days,
    )?;
    if !state.store.category_exists(listing.category_id).await? {
        return Err(Error::validation(format!(
            "Category not found: {}",
            listing.category_id
        )));
    }

    let created = state.store.create_listing(listing, caller.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /listings/{id}`: active listings only
pub async fn get_listing(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Listing>> {
    let Path(id) = id.map_err(|_| Error::not_found("Listing not found"))?;
    state
        .store
        .get_listing(id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("Listing not found"))
}

/// `PUT /listings/{id}`: owner only
pub async fn update_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    id: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<UpdateListingRequest>, JsonRejection>,
) -> Result<Json<Listing>> {
    let Path(id) = id.map_err(|_| Error::not_found("Listing not found"))?;
    let changes = validate_listing_changes(json_body(payload)?, Utc::now())?;
    if let Some(category_id) = changes.category_id {
        if !state.store.category_exists(category_id).await? {
            return Err(Error::validation(format!(
                "Category not found: {}",
                category_id
            )));
        }
    }

    let updated = state.store.update_listing(id, changes, &caller).await?;
    Ok(Json(updated))
}

/// `DELETE /listings/{id}`: owner only
pub async fn delete_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(id) = id.map_err(|_| Error::not_found("Listing not found"))?;
    state.store.delete_listing(id, &caller).await?;
    Ok(message("Listing deleted successfully"))
}
