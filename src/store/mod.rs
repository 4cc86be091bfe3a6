//! Persistence behind the HTTP API
//!
//! Handlers only see [`MarketplaceStore`]; the concrete store is chosen at
//! startup and injected through the application state.

use async_trait::async_trait;
use marketplace_auth::AuthenticatedUser;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Category, Favorite, Listing, ListingChanges, Message, NewListing, NewMessage, Profile,
    ProfileChanges,
};
use crate::query::{ListingQuery, SearchQuery};

mod memory;
mod supabase;

pub use memory::InMemoryStore;
pub use supabase::SupabaseStore;

/// The caller a store operation runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Forwarded to the backend so row level policies apply
    pub access_token: String,
}

impl Identity {
    pub fn new(user: AuthenticatedUser, access_token: &str) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    /// Listings matching `query`, sorted and paged
    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>>;

    async fn search_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>>;

    /// An active listing with its category and seller summaries
    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>>;

    /// A listing in any status
    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>>;

    async fn create_listing(
        &self,
        listing: NewListing,
        caller: Option<&Identity>,
    ) -> Result<Listing>;

    /// Apply `changes` to a listing owned by `caller`
    async fn update_listing(
        &self,
        id: Uuid,
        changes: ListingChanges,
        caller: &Identity,
    ) -> Result<Listing>;

    /// Delete a listing owned by `caller`
    async fn delete_listing(&self, id: Uuid, caller: &Identity) -> Result<()>;

    /// Every category, ordered by name
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    async fn category_exists(&self, id: Uuid) -> Result<bool>;

    /// The caller's favorites, newest first
    async fn list_favorites(&self, caller: &Identity) -> Result<Vec<Favorite>>;

    async fn add_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<Favorite>;

    async fn remove_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<()>;

    /// Messages the caller sent or received, newest first
    async fn list_messages(
        &self,
        listing_id: Option<Uuid>,
        caller: &Identity,
    ) -> Result<Vec<Message>>;

    async fn create_message(&self, message: NewMessage, caller: &Identity) -> Result<Message>;

    async fn get_profile(&self, caller: &Identity) -> Result<Option<Profile>>;

    async fn update_profile(&self, changes: ProfileChanges, caller: &Identity) -> Result<Profile>;
}

/// Error for a mutation that matched no listing owned by the caller
///
/// `existing` is the listing as found without the owner restriction.
pub(crate) fn ownership_error(existing: Option<&Listing>, caller: &Identity) -> Error {
    match existing {
        None => Error::not_found("Listing not found"),
        Some(listing) => {
            tracing::warn!(
                listing_id = %listing.id,
                user_id = %caller.user_id,
                "rejected change to a listing the caller does not own"
            );
            Error::unauthorized("You do not own this listing")
        }
    }
}
