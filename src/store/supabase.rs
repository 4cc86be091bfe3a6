//! Store backed by the Supabase PostgREST API

use async_trait::async_trait;
use marketplace_postgrest::{PostgrestClient, PostgrestError, SortOrder};
use reqwest::Client;
use serde::de::IgnoredAny;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ownership_error, Identity, MarketplaceStore};
use crate::error::{Error, Result};
use crate::models::{
    Category, Favorite, Listing, ListingChanges, ListingStatus, Message, NewFavorite, NewListing,
    NewMessage, Profile, ProfileChanges,
};
use crate::query::{ListingQuery, SearchQuery, LISTING_COLUMNS};

/// Listing detail read, with the seller's contact summary
const LISTING_DETAIL_COLUMNS: &str =
    "*,categories(name,slug),profiles(display_name,avatar_url,location,phone)";

const FAVORITE_COLUMNS: &str =
    "*,listings(*,categories(name,slug),profiles(display_name,avatar_url))";

const MESSAGE_COLUMNS: &str = "*,\
sender:profiles!messages_sender_id_fkey(display_name,avatar_url),\
recipient:profiles!messages_recipient_id_fkey(display_name,avatar_url),\
listings(id,title)";

/// Postgres error codes surfaced through PostgREST
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

/// Store that keeps everything in the hosted database
///
/// Every operation is a single PostgREST request, plus one lookup when a
/// mutation matched nothing and the reason has to be told apart.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    http_client: Client,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
        }
    }

    /// Request builder for `table`, acting as `caller` when given
    /// A listing in any status, as far as `caller` may see it
    async fn lookup_listing(&self, id: Uuid, caller: Option<&Identity>) -> Result<Option<Listing>> {
        let request = self
            .table("listings", caller)?
            .select(LISTING_COLUMNS)
            .eq("id", id);
        Ok(request.execute_one().await?)
    }

    fn table(&self, name: &str, caller: Option<&Identity>) -> Result<PostgrestClient> {
        let client =
            PostgrestClient::new(&self.base_url, &self.api_key, name, self.http_client.clone());
        match caller {
            Some(identity) => Ok(client.with_auth(&identity.access_token)?),
            None => Ok(client),
        }
    }
}

/// Translate constraint violations on insert into caller errors
fn write_error(err: PostgrestError, missing_reference: Error) -> Error {
    if err.code() == Some(FOREIGN_KEY_VIOLATION) {
        missing_reference
    } else {
        Error::Store(err)
    }
}

fn single_row<T>(rows: Vec<T>, what: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| Error::internal(format!("{} was written but not returned", what)))
}

#[async_trait]
impl MarketplaceStore for SupabaseStore {
    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let request = query.apply(self.table("listings", None)?);
        debug!(params = ?request.query_pairs(), "listing query");
        Ok(request.execute().await?)
    }

    async fn search_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>> {
        let request = query.apply(self.table("listings", None)?);
        debug!(params = ?request.query_pairs(), "search query");
        Ok(request.execute().await?)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let request = self
            .table("listings", None)?
            .select(LISTING_DETAIL_COLUMNS)
            .eq("id", id)
            .eq("status", ListingStatus::Active.as_str());
        Ok(request.execute_one().await?)
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        self.lookup_listing(id, None).await
    }

    async fn create_listing(
        &self,
        listing: NewListing,
        caller: Option<&Identity>,
    ) -> Result<Listing> {
        let rows: Vec<Listing> = self
            .table("listings", caller)?
            .select(LISTING_COLUMNS)
            .insert(&listing)
            .await
            .map_err(|e| write_error(e, Error::validation("Category not found")))?;
        let created = single_row(rows, "listing")?;
        info!(listing_id = %created.id, "listing created");
        Ok(created)
    }

    async fn update_listing(
        &self,
        id: Uuid,
        changes: ListingChanges,
        caller: &Identity,
    ) -> Result<Listing> {
        let rows: Vec<Listing> = self
            .table("listings", Some(caller))?
            .select(LISTING_COLUMNS)
            .eq("id", id)
            .eq("user_id", caller.user_id)
            .update(&changes)
            .await
            .map_err(|e| write_error(e, Error::validation("Category not found")))?;

        match rows.into_iter().next() {
            Some(listing) => Ok(listing),
            None => {
                let existing = self.lookup_listing(id, Some(caller)).await?;
                Err(ownership_error(existing.as_ref(), caller))
            }
        }
    }

    async fn delete_listing(&self, id: Uuid, caller: &Identity) -> Result<()> {
        let rows: Vec<IgnoredAny> = self
            .table("listings", Some(caller))?
            .select("id")
            .eq("id", id)
            .eq("user_id", caller.user_id)
            .delete()
            .await?;

        if rows.is_empty() {
            let existing = self.lookup_listing(id, Some(caller)).await?;
            return Err(ownership_error(existing.as_ref(), caller));
        }
        info!(listing_id = %id, "listing deleted");
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let request = self
            .table("categories", None)?
            .select("*")
            .order("name", SortOrder::Ascending);
        Ok(request.execute().await?)
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let request = self.table("categories", None)?.select("*").eq("slug", slug);
        Ok(request.execute_one().await?)
    }

    async fn category_exists(&self, id: Uuid) -> Result<bool> {
        let request = self.table("categories", None)?.select("id").eq("id", id);
        Ok(request.execute_one::<IgnoredAny>().await?.is_some())
    }

    async fn list_favorites(&self, caller: &Identity) -> Result<Vec<Favorite>> {
        let request = self
            .table("favorites", Some(caller))?
            .select(FAVORITE_COLUMNS)
            .eq("user_id", caller.user_id)
            .order("created_at", SortOrder::Descending);
        Ok(request.execute().await?)
    }

    async fn add_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<Favorite> {
        let favorite = NewFavorite {
            user_id: caller.user_id,
            listing_id,
        };
        let rows: Vec<Favorite> = self
            .table("favorites", Some(caller))?
            .select(FAVORITE_COLUMNS)
            .insert(&favorite)
            .await
            .map_err(|e| {
                if e.code() == Some(UNIQUE_VIOLATION) {
                    Error::validation("Listing is already a favorite")
                } else {
                    write_error(e, Error::not_found("Listing not found"))
                }
            })?;
        single_row(rows, "favorite")
    }

    async fn remove_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<()> {
        let _: Vec<IgnoredAny> = self
            .table("favorites", Some(caller))?
            .select("id")
            .eq("user_id", caller.user_id)
            .eq("listing_id", listing_id)
            .delete()
            .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        listing_id: Option<Uuid>,
        caller: &Identity,
    ) -> Result<Vec<Message>> {
        let mut request = self
            .table("messages", Some(caller))?
            .select(MESSAGE_COLUMNS)
            .or(&format!(
                "sender_id.eq.{},recipient_id.eq.{}",
                caller.user_id, caller.user_id
            ))
            .order("created_at", SortOrder::Descending);
        if let Some(listing_id) = listing_id {
            request = request.eq("listing_id", listing_id);
        }
        Ok(request.execute().await?)
    }

    async fn create_message(&self, message: NewMessage, caller: &Identity) -> Result<Message> {
        let rows: Vec<Message> = self
            .table("messages", Some(caller))?
            .select(MESSAGE_COLUMNS)
            .insert(&message)
            .await
            .map_err(|e| write_error(e, Error::not_found("Listing or recipient not found")))?;
        single_row(rows, "message")
    }

    async fn get_profile(&self, caller: &Identity) -> Result<Option<Profile>> {
        let request = self
            .table("profiles", Some(caller))?
            .select("*")
            .eq("id", caller.user_id);
        Ok(request.execute_one().await?)
    }

    async fn update_profile(&self, changes: ProfileChanges, caller: &Identity) -> Result<Profile> {
        let rows: Vec<Profile> = self
            .table("profiles", Some(caller))?
            .select("*")
            .eq("id", caller.user_id)
            .update(&changes)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::not_found("Profile not found"))
    }
}
