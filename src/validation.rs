//! Request payloads and the rules they are checked against
//!
//! Payloads arrive loosely typed so a bad field becomes a readable 400
//! instead of a body rejection. Each `validate_*` function turns a payload
//! into the record written to the store.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    ListingChanges, ListingCondition, ListingStatus, NewListing, NewMessage, ProfileChanges,
};

/// Longest message body accepted
pub const MAX_MESSAGE_LENGTH: usize = 5000;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub condition: Option<String>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub is_free: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<String>,
    pub location: Option<String>,
    pub condition: Option<String>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub is_free: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMessageRequest {
    pub listing_id: Option<String>,
    pub recipient_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FavoriteRequest {
    pub listing_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Parse `value` as a UUID, naming `field` in the error
pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim())
        .map_err(|_| Error::validation(format!("Invalid {} format: {}", field, value)))
}

/// Check a submitted listing and build the row to insert
///
/// `owner` is attached only when the request was authenticated.
pub fn validate_new_listing(
    request: CreateListingRequest,
    owner: Option<Uuid>,
    now: DateTime<Utc>,
    ttl_days: i64,
) -> Result<NewListing> {
    let title = non_blank(request.title);
    let description = non_blank(request.description);
    let category_id = non_blank(request.category_id);
    let email = non_blank(request.email);

    let (title, description, category_id, email) = match (title, description, category_id, email)
    {
        (Some(title), Some(description), Some(category_id), Some(email)) => {
            (title, description, category_id, email)
        }
        _ => {
            return Err(Error::validation(
                "Missing required fields: title, description, category_id, or email",
            ))
        }
    };

    if !is_valid_email(&email) {
        return Err(Error::validation("Invalid email format"));
    }
    if let Some(price) = request.price {
        check_price(price)?;
    }
    let category_id = parse_uuid("category ID", &category_id)?;
    let condition = match non_blank(request.condition) {
        Some(condition) => condition.parse()?,
        None => ListingCondition::New,
    };

    // No price means the item is given away
    let is_free = request.is_free.unwrap_or(false) || request.price.is_none();
    let price = if is_free { None } else { request.price };

    Ok(NewListing {
        title,
        description,
        price,
        category_id,
        user_id: owner,
        location: non_blank(request.location),
        email,
        condition,
        status: ListingStatus::Active,
        images: request.images.unwrap_or_default(),
        tags: request.tags.unwrap_or_default(),
        is_free,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::days(ttl_days),
    })
}

/// Check an owner's edit and build the patch to apply
pub fn validate_listing_changes(
    request: UpdateListingRequest,
    now: DateTime<Utc>,
) -> Result<ListingChanges> {
    let mut changes = ListingChanges {
        updated_at: now,
        ..Default::default()
    };

    if let Some(title) = request.title {
        changes.title =
            Some(non_blank(Some(title)).ok_or_else(|| Error::validation("Title cannot be empty"))?);
    }
    if let Some(description) = request.description {
        changes.description = Some(
            non_blank(Some(description))
                .ok_or_else(|| Error::validation("Description cannot be empty"))?,
        );
    }
    if let Some(category_id) = request.category_id {
        changes.category_id = Some(parse_uuid("category ID", &category_id)?);
    }
    if let Some(location) = request.location {
        changes.location = Some(location.trim().to_string());
    }
    if let Some(condition) = request.condition {
        changes.condition = Some(condition.parse()?);
    }
    if let Some(status) = request.status {
        changes.status = Some(status.parse::<ListingStatus>()?);
    }
    changes.images = request.images;
    changes.tags = request.tags;

    if let Some(price) = request.price {
        check_price(price)?;
    }
    match (request.is_free, request.price) {
        (Some(true), _) => {
            changes.is_free = Some(true);
            changes.price = Some(None);
        }
        (_, Some(price)) => {
            changes.is_free = Some(false);
            changes.price = Some(Some(price));
        }
        (Some(false), None) => changes.is_free = Some(false),
        (None, None) => {}
    }

    Ok(changes)
}

/// Check a message and build the row to insert, sent by `sender`
pub fn validate_new_message(request: CreateMessageRequest, sender: Uuid) -> Result<NewMessage> {
    let (listing_id, recipient_id, content) = match (
        non_blank(request.listing_id),
        non_blank(request.recipient_id),
        non_blank(request.content),
    ) {
        (Some(listing_id), Some(recipient_id), Some(content)) => {
            (listing_id, recipient_id, content)
        }
        _ => return Err(Error::validation("Missing required fields")),
    };

    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(Error::validation(format!(
            "Message cannot be longer than {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    let listing_id = parse_uuid("listing_id", &listing_id)?;
    let recipient_id = parse_uuid("recipient_id", &recipient_id)?;
    if recipient_id == sender {
        return Err(Error::validation("Cannot send a message to yourself"));
    }

    Ok(NewMessage {
        listing_id,
        sender_id: sender,
        recipient_id,
        content,
    })
}

/// Listing id named by a favorite request body or query string
pub fn validate_favorite(request: &FavoriteRequest) -> Result<Uuid> {
    let listing_id = non_blank(request.listing_id.clone())
        .ok_or_else(|| Error::validation("Missing listing_id"))?;
    parse_uuid("listing_id", &listing_id)
}

pub fn validate_profile_changes(
    request: UpdateProfileRequest,
    now: DateTime<Utc>,
) -> Result<ProfileChanges> {
    let trim = |value: Option<String>| value.map(|v| v.trim().to_string());

    let avatar_url = trim(request.avatar_url);
    if let Some(avatar_url) = avatar_url.as_deref().filter(|v| !v.is_empty()) {
        let valid = Url::parse(avatar_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            return Err(Error::validation("Invalid avatar URL"));
        }
    }

    Ok(ProfileChanges {
        display_name: trim(request.display_name),
        bio: trim(request.bio),
        location: trim(request.location),
        phone: trim(request.phone),
        avatar_url,
        updated_at: now,
    })
}

fn check_price(price: f64) -> Result<()> {
    if !price.is_finite() {
        return Err(Error::validation("Invalid price"));
    }
    if price < 0.0 {
        return Err(Error::validation("Price cannot be negative"));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORY: &str = "9d3f2c1e-5a8b-4c7d-9e0f-1a2b3c4d5e6f";

    fn now() -> DateTime<Utc> {
        "2024-05-01T10:00:00Z".parse().unwrap()
    }

    fn request() -> CreateListingRequest {
        CreateListingRequest {
            title: Some("Road bike".to_string()),
            description: Some("54cm frame, new tires".to_string()),
            price: Some(250.0),
            category_id: Some(CATEGORY.to_string()),
            location: Some("Minneapolis".to_string()),
            email: Some("seller@example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_listing_defaults() {
        let owner = Uuid::new_v4();
        let listing = validate_new_listing(request(), Some(owner), now(), 30).unwrap();

        assert_eq!(listing.status, ListingStatus::Active);
        assert_eq!(listing.condition, ListingCondition::New);
        assert_eq!(listing.price, Some(250.0));
        assert!(!listing.is_free);
        assert!(listing.images.is_empty() && listing.tags.is_empty());
        assert_eq!(listing.user_id, Some(owner));
        assert_eq!(listing.created_at, now());
        assert_eq!(listing.updated_at, now());
        assert_eq!(listing.expires_at - listing.created_at, Duration::days(30));
    }

    #[test]
    fn test_free_listing_has_no_price() {
        let mut free = request();
        free.is_free = Some(true);
        let listing = validate_new_listing(free, None, now(), 30).unwrap();
        assert!(listing.is_free);
        assert_eq!(listing.price, None);
        assert_eq!(listing.user_id, None);

        let mut unpriced = request();
        unpriced.price = None;
        let listing = validate_new_listing(unpriced, None, now(), 30).unwrap();
        assert!(listing.is_free);
    }

    #[test]
    fn test_rejects_negative_price() {
        let mut negative = request();
        negative.price = Some(-5.0);
        let err = validate_new_listing(negative, None, now(), 30).unwrap_err();
        assert_eq!(err.to_string(), "Price cannot be negative");

        let mut zero = request();
        zero.price = Some(0.0);
        assert!(validate_new_listing(zero, None, now(), 30).is_ok());
    }

    #[test]
    fn test_rejects_missing_fields() {
        for blank in 0..4 {
            let mut incomplete = request();
            match blank {
                0 => incomplete.title = Some("   ".to_string()),
                1 => incomplete.description = None,
                2 => incomplete.category_id = Some(String::new()),
                _ => incomplete.email = None,
            }
            let err = validate_new_listing(incomplete, None, now(), 30).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[test]
    fn test_email_and_category_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@c.com"));

        let mut bad_email = request();
        bad_email.email = Some("seller.example.com".to_string());
        let err = validate_new_listing(bad_email, None, now(), 30).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email format");

        let mut bad_category = request();
        bad_category.category_id = Some("electronics".to_string());
        assert!(validate_new_listing(bad_category, None, now(), 30).is_err());

        let mut bad_condition = request();
        bad_condition.condition = Some("mint".to_string());
        assert!(validate_new_listing(bad_condition, None, now(), 30).is_err());
    }

    #[test]
    fn test_listing_changes() {
        let changes = validate_listing_changes(
            UpdateListingRequest {
                title: Some(" Gravel bike ".to_string()),
                is_free: Some(true),
                price: Some(100.0),
                status: Some("sold".to_string()),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(changes.title.as_deref(), Some("Gravel bike"));
        assert_eq!(changes.price, Some(None));
        assert_eq!(changes.is_free, Some(true));
        assert_eq!(changes.status, Some(ListingStatus::Sold));
        assert_eq!(changes.updated_at, now());

        let priced = validate_listing_changes(
            UpdateListingRequest {
                price: Some(80.0),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(priced.price, Some(Some(80.0)));
        assert_eq!(priced.is_free, Some(false));

        assert!(validate_listing_changes(
            UpdateListingRequest {
                price: Some(-1.0),
                ..Default::default()
            },
            now()
        )
        .is_err());
        assert!(validate_listing_changes(
            UpdateListingRequest {
                title: Some(String::new()),
                ..Default::default()
            },
            now()
        )
        .is_err());
    }

    #[test]
    fn test_new_message() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let listing = Uuid::new_v4();
        let request = |content: &str, to: Uuid| CreateMessageRequest {
            listing_id: Some(listing.to_string()),
            recipient_id: Some(to.to_string()),
            content: Some(content.to_string()),
        };

        let message = validate_new_message(request(" Still available? ", recipient), sender).unwrap();
        assert_eq!(message.content, "Still available?");
        assert_eq!(message.sender_id, sender);

        assert!(validate_new_message(request("", recipient), sender).is_err());
        assert!(validate_new_message(request("hi", sender), sender).is_err());
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(validate_new_message(request(&long, recipient), sender).is_err());
    }

    #[test]
    fn test_favorite_and_profile() {
        assert!(validate_favorite(&FavoriteRequest { listing_id: None }).is_err());
        let id = Uuid::new_v4();
        assert_eq!(
            validate_favorite(&FavoriteRequest {
                listing_id: Some(id.to_string())
            })
            .unwrap(),
            id
        );

        let changes = validate_profile_changes(
            UpdateProfileRequest {
                display_name: Some(" Sam ".to_string()),
                avatar_url: Some("https://cdn.example.com/a.png".to_string()),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(changes.display_name.as_deref(), Some("Sam"));
        assert!(changes.bio.is_none());

        assert!(validate_profile_changes(
            UpdateProfileRequest {
                avatar_url: Some("javascript:alert(1)".to_string()),
                ..Default::default()
            },
            now()
        )
        .is_err());
    }
}
