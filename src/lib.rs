//! Classifieds marketplace service
//!
//! An HTTP API for browsing, searching, posting and messaging about listings.
//! Data and identity live in a Supabase project, reached through the
//! `marketplace-postgrest` and `marketplace-auth` clients; an in-memory store
//! answers the same operations for local development.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod store;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use marketplace_auth::AuthClient;
use reqwest::Client;
use tracing::info;

use crate::api::AppState;
use crate::config::{AppConfig, StoreBackend};
use crate::error::Result;
use crate::store::{InMemoryStore, MarketplaceStore, SupabaseStore};

/// The assembled service
pub struct Marketplace {
    state: AppState,
}

impl Marketplace {
    /// Wire the store and auth client named by `config`
    ///
    /// # Example
    ///
    /// ```
    /// use marketplace::Marketplace;
    /// use marketplace::config::{AppConfig, StoreBackend};
    ///
    /// let config = AppConfig::default().with_store(StoreBackend::Memory);
    /// let app = Marketplace::from_config(config).unwrap().router();
    /// ```
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let mut auth = AuthClient::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            http_client.clone(),
        );
        if let Some(secret) = &config.jwt_secret {
            auth = auth.with_jwt_secret(secret);
        }

        let store: Arc<dyn MarketplaceStore> = match config.store {
            StoreBackend::Supabase => Arc::new(SupabaseStore::new(
                &config.supabase_url,
                &config.supabase_anon_key,
                http_client,
            )),
            StoreBackend::Memory => Arc::new(InMemoryStore::with_default_categories()),
        };
        info!(
            store = %config.store,
            local_token_verification = auth.verifies_locally(),
            "marketplace configured"
        );

        Ok(Self::with_store(store, auth, config))
    }

    /// Assemble around an existing store and auth client
    pub fn with_store(store: Arc<dyn MarketplaceStore>, auth: AuthClient, config: AppConfig) -> Self {
        Self {
            state: AppState::new(store, auth, config),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    /// The HTTP router with every route mounted
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::api::AppState;
    pub use crate::config::{AppConfig, StoreBackend};
    pub use crate::error::{Error, Result};
    pub use crate::models::{Category, Listing, ListingCondition, ListingStatus};
    pub use crate::query::{ListingFilters, ListingQuery, QueryLimits};
    pub use crate::store::{Identity, InMemoryStore, MarketplaceStore, SupabaseStore};
    pub use crate::Marketplace;
}
