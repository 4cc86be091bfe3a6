//! Store that keeps everything in process memory
//!
//! Answers every operation the way the hosted database does, including the
//! embedded category and profile summaries, so the HTTP API can run without
//! a backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{ownership_error, Identity, MarketplaceStore};
use crate::error::{Error, Result};
use crate::models::{
    Category, Favorite, Listing, ListingChanges, ListingStatus, ListingSummary, Message,
    NewListing, NewMessage, Profile, ProfileChanges,
};
use crate::query::{ListingQuery, SearchQuery};

/// Categories a fresh store starts with, as `(name, slug)`
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Electronics", "electronics"),
    ("Vehicles", "vehicles"),
    ("Home & Garden", "home-garden"),
    ("Clothing & Accessories", "clothing-accessories"),
    ("Sports & Recreation", "sports-recreation"),
    ("Books & Media", "books-media"),
    ("Free Stuff", "free-stuff"),
    ("Services", "services"),
];

#[derive(Debug, Default)]
struct Tables {
    categories: Vec<Category>,
    listings: HashMap<Uuid, Listing>,
    favorites: Vec<Favorite>,
    messages: Vec<Message>,
    profiles: HashMap<Uuid, Profile>,
}

impl Tables {
    /// Listing row with its category summary, and the seller summary for detail reads
    fn hydrate(&self, listing: &Listing, with_seller: bool) -> Listing {
        let mut listing = listing.clone();
        listing.categories = listing
            .category_id
            .and_then(|id| self.categories.iter().find(|c| c.id == id))
            .map(Category::summary);
        listing.profiles = if with_seller {
            listing
                .user_id
                .and_then(|id| self.profiles.get(&id))
                .map(|profile| {
                    let mut summary = profile.summary();
                    summary.location = profile.location.clone();
                    summary.phone = profile.phone.clone();
                    summary
                })
        } else {
            None
        };
        listing
    }

    fn hydrated_listings(&self) -> Vec<Listing> {
        self.listings
            .values()
            .map(|listing| self.hydrate(listing, false))
            .collect()
    }

    fn hydrate_favorite(&self, favorite: &Favorite) -> Favorite {
        let mut favorite = favorite.clone();
        favorite.listings = self.listings.get(&favorite.listing_id).map(|listing| {
            let mut listing = self.hydrate(listing, true);
            if let Some(seller) = listing.profiles.as_mut() {
                seller.location = None;
                seller.phone = None;
            }
            listing
        });
        favorite
    }

    fn hydrate_message(&self, message: &Message) -> Message {
        let mut message = message.clone();
        message.sender = self.profiles.get(&message.sender_id).map(Profile::summary);
        message.recipient = self.profiles.get(&message.recipient_id).map(Profile::summary);
        message.listings = self.listings.get(&message.listing_id).map(|l| ListingSummary {
            id: l.id,
            title: l.title.clone(),
        });
        message
    }

    fn category_exists(&self, id: Uuid) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    /// The backend creates a profile row for every account on signup
    fn profile_for(&mut self, user_id: Uuid) -> &mut Profile {
        self.profiles.entry(user_id).or_insert_with(|| blank_profile(user_id))
    }
}

fn blank_profile(user_id: Uuid) -> Profile {
    let now = Utc::now();
    Profile {
        id: user_id,
        display_name: None,
        bio: None,
        location: None,
        phone: None,
        avatar_url: None,
        created_at: Some(now),
        updated_at: Some(now),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// An empty store without categories
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with [`DEFAULT_CATEGORIES`]
    pub fn with_default_categories() -> Self {
        let now = Utc::now();
        let categories = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, slug)| Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: slug.to_string(),
                description: None,
                icon: None,
                created_at: Some(now),
            })
            .collect();

        Self {
            tables: RwLock::new(Tables {
                categories,
                ..Default::default()
            }),
        }
    }

    pub async fn insert_category(&self, name: &str, slug: &str) -> Category {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            icon: None,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.categories.push(category.clone());
        category
    }

    /// Store a listing row as is, bypassing validation
    pub async fn insert_listing(&self, listing: Listing) {
        self.tables.write().await.listings.insert(listing.id, listing);
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.tables.write().await.profiles.insert(profile.id, profile);
    }
}

#[async_trait]
impl MarketplaceStore for InMemoryStore {
    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let tables = self.tables.read().await;
        Ok(query.run(&tables.hydrated_listings()))
    }

    async fn search_listings(&self, query: &SearchQuery) -> Result<Vec<Listing>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Listing> = tables
            .hydrated_listings()
            .into_iter()
            .filter(|l| query.matches(l))
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        found.truncate(query.limit);
        Ok(found)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .get(&id)
            .filter(|l| l.status == ListingStatus::Active)
            .map(|l| tables.hydrate(l, true)))
    }

    async fn find_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let tables = self.tables.read().await;
        Ok(tables.listings.get(&id).map(|l| tables.hydrate(l, false)))
    }

    async fn create_listing(
        &self,
        listing: NewListing,
        caller: Option<&Identity>,
    ) -> Result<Listing> {
        let mut tables = self.tables.write().await;
        if !tables.category_exists(listing.category_id) {
            return Err(Error::validation("Category not found"));
        }
        if let Some(caller) = caller {
            tables.profile_for(caller.user_id);
        }

        let row = Listing {
            id: Uuid::new_v4(),
            title: listing.title,
            description: listing.description,
            price: listing.price,
            category_id: Some(listing.category_id),
            user_id: listing.user_id,
            location: listing.location,
            email: Some(listing.email),
            condition: Some(listing.condition),
            status: listing.status,
            images: listing.images,
            tags: listing.tags,
            is_free: listing.is_free,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
            expires_at: Some(listing.expires_at),
            categories: None,
            profiles: None,
        };
        let created = tables.hydrate(&row, false);
        tables.listings.insert(row.id, row);
        info!(listing_id = %created.id, "listing created");
        Ok(created)
    }

    async fn update_listing(
        &self,
        id: Uuid,
        changes: ListingChanges,
        caller: &Identity,
    ) -> Result<Listing> {
        let mut tables = self.tables.write().await;
        if let Some(category_id) = changes.category_id {
            if !tables.category_exists(category_id) {
                return Err(Error::validation("Category not found"));
            }
        }

        match tables.listings.get_mut(&id) {
            Some(listing) if listing.is_owned_by(caller.user_id) => {
                changes.apply_to(listing);
            }
            other => return Err(ownership_error(other.map(|l| &*l), caller)),
        }
        let updated = tables.listings.get(&id).map(|l| tables.hydrate(l, false));
        updated.ok_or_else(|| Error::not_found("Listing not found"))
    }

    async fn delete_listing(&self, id: Uuid, caller: &Identity) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.listings.get(&id) {
            Some(listing) if listing.is_owned_by(caller.user_id) => {}
            other => return Err(ownership_error(other, caller)),
        }
        tables.listings.remove(&id);
        tables.favorites.retain(|f| f.listing_id != id);
        tables.messages.retain(|m| m.listing_id != id);
        info!(listing_id = %id, "listing deleted");
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.tables.read().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn category_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.read().await.category_exists(id))
    }

    async fn list_favorites(&self, caller: &Identity) -> Result<Vec<Favorite>> {
        let tables = self.tables.read().await;
        let mut favorites: Vec<Favorite> = tables
            .favorites
            .iter()
            .filter(|f| f.user_id == caller.user_id)
            .map(|f| tables.hydrate_favorite(f))
            .collect();
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favorites)
    }

    async fn add_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<Favorite> {
        let mut tables = self.tables.write().await;
        if !tables.listings.contains_key(&listing_id) {
            return Err(Error::not_found("Listing not found"));
        }
        let duplicate = tables
            .favorites
            .iter()
            .any(|f| f.user_id == caller.user_id && f.listing_id == listing_id);
        if duplicate {
            return Err(Error::validation("Listing is already a favorite"));
        }

        let favorite = Favorite {
            id: Uuid::new_v4(),
            user_id: caller.user_id,
            listing_id,
            created_at: Utc::now(),
            listings: None,
        };
        let hydrated = tables.hydrate_favorite(&favorite);
        tables.favorites.push(favorite);
        Ok(hydrated)
    }

    async fn remove_favorite(&self, listing_id: Uuid, caller: &Identity) -> Result<()> {
        self.tables
            .write()
            .await
            .favorites
            .retain(|f| !(f.user_id == caller.user_id && f.listing_id == listing_id));
        Ok(())
    }

    async fn list_messages(
        &self,
        listing_id: Option<Uuid>,
        caller: &Identity,
    ) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.sender_id == caller.user_id || m.recipient_id == caller.user_id)
            .filter(|m| listing_id.map_or(true, |id| m.listing_id == id))
            .map(|m| tables.hydrate_message(m))
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn create_message(&self, message: NewMessage, caller: &Identity) -> Result<Message> {
        let mut tables = self.tables.write().await;
        if !tables.listings.contains_key(&message.listing_id)
            || !tables.profiles.contains_key(&message.recipient_id)
        {
            return Err(Error::not_found("Listing or recipient not found"));
        }
        tables.profile_for(caller.user_id);

        let row = Message {
            id: Uuid::new_v4(),
            listing_id: message.listing_id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            content: message.content,
            is_read: false,
            created_at: Utc::now(),
            sender: None,
            recipient: None,
            listings: None,
        };
        let hydrated = tables.hydrate_message(&row);
        tables.messages.push(row);
        Ok(hydrated)
    }

    async fn get_profile(&self, caller: &Identity) -> Result<Option<Profile>> {
        let mut tables = self.tables.write().await;
        Ok(Some(tables.profile_for(caller.user_id).clone()))
    }

    async fn update_profile(&self, changes: ProfileChanges, caller: &Identity) -> Result<Profile> {
        let mut tables = self.tables.write().await;
        let profile = tables.profile_for(caller.user_id);
        changes.apply_to(profile);
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingCondition;
    use crate::query::QueryLimits;
    use chrono::Duration;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: None,
            access_token: "token".to_string(),
        }
    }

    fn new_listing(category_id: Uuid, owner: Option<Uuid>) -> NewListing {
        let now = Utc::now();
        NewListing {
            title: "Desk lamp".to_string(),
            description: "Warm light".to_string(),
            price: Some(15.0),
            category_id,
            user_id: owner,
            location: None,
            email: "seller@example.com".to_string(),
            condition: ListingCondition::Good,
            status: ListingStatus::Active,
            images: vec![],
            tags: vec![],
            is_free: false,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn test_create_embeds_category_and_rejects_unknown_one() {
        let store = InMemoryStore::with_default_categories();
        let category = store
            .get_category_by_slug("home-garden")
            .await
            .unwrap()
            .unwrap();

        let created = store
            .create_listing(new_listing(category.id, None), None)
            .await
            .unwrap();
        assert_eq!(created.categories.unwrap().slug, "home-garden");

        let err = store
            .create_listing(new_listing(Uuid::new_v4(), None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_mutations_check_ownership() {
        let store = InMemoryStore::with_default_categories();
        let category = store.list_categories().await.unwrap()[0].clone();
        let owner = identity();
        let stranger = identity();
        let listing = store
            .create_listing(new_listing(category.id, Some(owner.user_id)), Some(&owner))
            .await
            .unwrap();
        let anonymous = store
            .create_listing(new_listing(category.id, None), None)
            .await
            .unwrap();

        let changes = ListingChanges {
            status: Some(ListingStatus::Sold),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let err = store
            .update_listing(listing.id, changes.clone(), &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        let err = store
            .delete_listing(anonymous.id, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        let err = store
            .delete_listing(Uuid::new_v4(), &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let updated = store
            .update_listing(listing.id, changes, &owner)
            .await
            .unwrap();
        assert_eq!(updated.status, ListingStatus::Sold);
        assert!(store.get_listing(listing.id).await.unwrap().is_none());

        let mine = store
            .list_listings(&ListingQuery::active(&QueryLimits::default()).owned_by(owner.user_id))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        store.delete_listing(listing.id, &owner).await.unwrap();
        assert!(store.find_listing(listing.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_favorites_and_messages() {
        let store = InMemoryStore::with_default_categories();
        let category = store.list_categories().await.unwrap()[0].clone();
        let seller = identity();
        let buyer = identity();
        let listing = store
            .create_listing(new_listing(category.id, Some(seller.user_id)), Some(&seller))
            .await
            .unwrap();

        let favorite = store.add_favorite(listing.id, &buyer).await.unwrap();
        assert_eq!(favorite.listings.unwrap().id, listing.id);
        assert!(store.add_favorite(listing.id, &buyer).await.is_err());
        assert!(matches!(
            store.add_favorite(Uuid::new_v4(), &buyer).await,
            Err(Error::NotFound(_))
        ));
        store.remove_favorite(listing.id, &buyer).await.unwrap();
        assert!(store.list_favorites(&buyer).await.unwrap().is_empty());

        let message = NewMessage {
            listing_id: listing.id,
            sender_id: buyer.user_id,
            recipient_id: seller.user_id,
            content: "Is it still available?".to_string(),
        };
        let sent = store.create_message(message.clone(), &buyer).await.unwrap();
        assert_eq!(sent.listings.unwrap().title, "Desk lamp");
        assert!(sent.recipient.is_some());

        let unknown_recipient = NewMessage {
            recipient_id: Uuid::new_v4(),
            ..message
        };
        assert!(matches!(
            store.create_message(unknown_recipient, &buyer).await,
            Err(Error::NotFound(_))
        ));

        assert_eq!(store.list_messages(None, &seller).await.unwrap().len(), 1);
        assert_eq!(
            store
                .list_messages(Some(Uuid::new_v4()), &seller)
                .await
                .unwrap()
                .len(),
            0
        );
        assert!(store.list_messages(None, &identity()).await.unwrap().is_empty());
    }
}
