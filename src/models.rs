//! Records exchanged with the store and the HTTP API

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// State an item is in, as claimed by the seller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl ListingCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCondition::New => "new",
            ListingCondition::LikeNew => "like-new",
            ListingCondition::Good => "good",
            ListingCondition::Fair => "fair",
            ListingCondition::Poor => "poor",
        }
    }
}

impl FromStr for ListingCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(ListingCondition::New),
            "like-new" | "like_new" => Ok(ListingCondition::LikeNew),
            "good" => Ok(ListingCondition::Good),
            "fair" => Ok(ListingCondition::Fair),
            "poor" => Ok(ListingCondition::Poor),
            other => Err(Error::validation(format!("Invalid condition: {}", other))),
        }
    }
}

impl fmt::Display for ListingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Sold,
    Pending,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Pending => "pending",
            ListingStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for ListingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ListingStatus::Active),
            "sold" => Ok(ListingStatus::Sold),
            "pending" => Ok(ListingStatus::Pending),
            "inactive" => Ok(ListingStatus::Inactive),
            other => Err(Error::validation(format!("Invalid status: {}", other))),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category columns embedded into listing reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub slug: String,
}

/// Profile columns embedded into listing and message reads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A single for-sale or free item post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub category_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub location: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub condition: Option<ListingCondition>,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<CategorySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<ProfileSummary>,
}

impl Listing {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }
}

/// Listing columns embedded into message reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn summary(&self) -> CategorySummary {
        CategorySummary {
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ProfileSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ProfileSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listings: Option<ListingSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub listing_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listings: Option<Listing>,
}

/// Per-user display data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            location: None,
            phone: None,
        }
    }
}

/// Row written when a listing is submitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub category_id: Uuid,
    pub user_id: Option<Uuid>,
    pub location: Option<String>,
    pub email: String,
    pub condition: ListingCondition,
    pub status: ListingStatus,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Columns an owner changes on a listing; absent fields are left alone
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ListingChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Some(None)` clears the price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ListingCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ListingStatus>,
    pub updated_at: DateTime<Utc>,
}

impl ListingChanges {
    /// Apply to an in-memory row the way the remote store would
    pub fn apply_to(&self, listing: &mut Listing) {
        if let Some(title) = &self.title {
            listing.title = title.clone();
        }
        if let Some(description) = &self.description {
            listing.description = description.clone();
        }
        if let Some(price) = self.price {
            listing.price = price;
        }
        if let Some(category_id) = self.category_id {
            listing.category_id = Some(category_id);
        }
        if let Some(location) = &self.location {
            listing.location = Some(location.clone());
        }
        if let Some(condition) = self.condition {
            listing.condition = Some(condition);
        }
        if let Some(images) = &self.images {
            listing.images = images.clone();
        }
        if let Some(tags) = &self.tags {
            listing.tags = tags.clone();
        }
        if let Some(is_free) = self.is_free {
            listing.is_free = is_free;
        }
        if let Some(status) = self.status {
            listing.status = status;
        }
        listing.updated_at = self.updated_at;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFavorite {
    pub user_id: Uuid,
    pub listing_id: Uuid,
}

/// Profile columns an owner changes; absent fields are left alone
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileChanges {
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(display_name) = &self.display_name {
            profile.display_name = Some(display_name.clone());
        }
        if let Some(bio) = &self.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(location) = &self.location {
            profile.location = Some(location.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        profile.updated_at = Some(self.updated_at);
    }
}

// PostgREST returns `null` for unset array and boolean columns
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_from_postgrest_row() {
        let row = json!({
            "id": "0b6f6c43-3f5e-4f4a-bc1c-7f0a39a1a001",
            "title": "Road bike",
            "description": "54cm frame",
            "price": 250.0,
            "category_id": "9d3f2c1e-5a8b-4c7d-9e0f-1a2b3c4d5e6f",
            "user_id": null,
            "location": "Minneapolis",
            "email": "seller@example.com",
            "condition": "like-new",
            "status": "active",
            "images": null,
            "tags": ["bike"],
            "is_free": false,
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00+00:00",
            "expires_at": "2024-05-31T10:00:00+00:00",
            "categories": { "name": "Sports", "slug": "sports" }
        });

        let listing: Listing = serde_json::from_value(row).unwrap();
        assert_eq!(listing.condition, Some(ListingCondition::LikeNew));
        assert!(listing.images.is_empty());
        assert_eq!(listing.categories.unwrap().slug, "sports");
        assert!(listing.profiles.is_none());
    }

    #[test]
    fn test_listing_changes_serialize_only_given_fields() {
        let changes = ListingChanges {
            price: Some(None),
            is_free: Some(true),
            updated_at: "2024-05-02T00:00:00Z".parse().unwrap(),
            ..Default::default()
        };
        let value = serde_json::to_value(&changes).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert!(object["price"].is_null());
        assert_eq!(object["is_free"], true);
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!("Like-New".parse::<ListingCondition>().unwrap(), ListingCondition::LikeNew);
        assert!("mint".parse::<ListingCondition>().is_err());
        assert_eq!(
            serde_json::to_value(ListingCondition::LikeNew).unwrap(),
            json!("like-new")
        );
    }
}
