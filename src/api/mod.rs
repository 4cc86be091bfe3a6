//! HTTP API of the marketplace
//!
//! Handlers receive everything they need through [`AppState`]; nothing is
//! looked up from process globals.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use marketplace_auth::AuthClient;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::store::MarketplaceStore;

mod auth;
mod categories;
mod error;
mod favorites;
mod listings;
mod messages;
mod profile;
mod search;

pub use auth::{AuthUser, MaybeUser};

/// Shared handles every handler works with
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketplaceStore>,
    pub auth: Arc<AuthClient>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn MarketplaceStore>, auth: AuthClient, config: AppConfig) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/listings",
            get(listings::list_listings).post(listings::create_listing),
        )
        .route("/listings/mine", get(listings::my_listings))
        .route(
            "/listings/{id}",
            get(listings::get_listing)
                .put(listings::update_listing)
                .delete(listings::delete_listing),
        )
        .route("/search", get(search::search))
        .route("/categories", get(categories::list_categories))
        .route("/categories/{slug}", get(categories::get_category))
        .route(
            "/favorites",
            get(favorites::list_favorites)
                .post(favorites::add_favorite)
                .delete(favorites::remove_favorite),
        )
        .route(
            "/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Body of a successful request without a record to return
fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// Unwrap a JSON body, reporting a malformed one as a validation error
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

fn query_params<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}
