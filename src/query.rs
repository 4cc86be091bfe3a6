//! Listing query builder
//!
//! Every listing read goes through [`ListingQuery`]: the optional filter bag
//! from the query string is validated once and turned into a fully specified
//! request. The same value renders the PostgREST request
//! ([`ListingQuery::apply`]) and evaluates rows in memory
//! ([`ListingQuery::matches`], [`ListingQuery::compare`]), so both stores
//! answer a query identically.

use std::cmp::Ordering;
use std::str::FromStr;

use marketplace_postgrest::{quote_filter_value, PostgrestClient, SortOrder};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Listing, ListingCondition, ListingStatus};

/// Columns of a listing read; embeds the category summary
pub const LISTING_COLUMNS: &str = "*,categories(name,slug)";

/// Same as [`LISTING_COLUMNS`] but drops listings without a matching category
const LISTING_COLUMNS_BY_CATEGORY: &str = "*,categories!inner(name,slug)";

/// Most results the quick search returns
pub const SEARCH_RESULT_LIMIT: usize = 20;

/// Filter values the UI sends to mean "no filter"
const CATEGORY_ANY: &str = "all";
const CONDITION_ANY: &str = "any";

/// Paging bounds for listing reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// The filter bag, as it arrives in the query string
///
/// Values are kept as text so malformed numbers surface as validation errors
/// with a readable message. Empty values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilters {
    pub category: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub condition: Option<String>,
    pub is_free: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingSort {
    #[default]
    Newest,
    Oldest,
    PriceLowToHigh,
    PriceHighToLow,
}

impl FromStr for ListingSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "created_at_desc" | "newest" | "relevance" => Ok(ListingSort::Newest),
            "created_at_asc" | "oldest" => Ok(ListingSort::Oldest),
            "price_asc" => Ok(ListingSort::PriceLowToHigh),
            "price_desc" => Ok(ListingSort::PriceHighToLow),
            other => Err(Error::validation(format!("Invalid sort order: {}", other))),
        }
    }
}

/// A fully specified, bounded listing read
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    /// `None` lists every status (owner views only)
    pub status: Option<ListingStatus>,
    pub owner: Option<Uuid>,
    pub category_slug: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub condition: Option<ListingCondition>,
    pub free_only: bool,
    pub sort: ListingSort,
    pub offset: usize,
    pub limit: usize,
}

impl ListingQuery {
    /// Active listings, newest first, first page
    pub fn active(limits: &QueryLimits) -> Self {
        Self {
            status: Some(ListingStatus::Active),
            owner: None,
            category_slug: None,
            search: None,
            location: None,
            min_price: None,
            max_price: None,
            condition: None,
            free_only: false,
            sort: ListingSort::Newest,
            offset: 0,
            limit: limits.default_page_size,
        }
    }

    /// Validate the filter bag and build the request it describes
    pub fn from_filters(filters: &ListingFilters, limits: &QueryLimits) -> Result<Self> {
        let mut query = Self::active(limits);

        query.category_slug =
            present(&filters.category).filter(|c| !c.eq_ignore_ascii_case(CATEGORY_ANY));
        query.search = text_term(&filters.search);
        query.location = text_term(&filters.location);
        query.min_price = parse_price("minPrice", &filters.min_price)?;
        query.max_price = parse_price("maxPrice", &filters.max_price)?;
        query.condition = match present(&filters.condition) {
            Some(c) if c.eq_ignore_ascii_case(CONDITION_ANY) => None,
            Some(c) => Some(c.parse()?),
            None => None,
        };
        query.free_only = match present(&filters.is_free) {
            Some(flag) => parse_flag("isFree", &flag)?,
            None => false,
        };
        if let Some(sort) = present(&filters.sort) {
            query.sort = sort.parse()?;
        }

        let page = match present(&filters.page) {
            Some(page) => parse_positive("page", &page)?,
            None => 1,
        };
        let limit = match present(&filters.limit) {
            Some(limit) => parse_positive("limit", &limit)?,
            None => limits.default_page_size,
        };
        query.limit = limit.min(limits.max_page_size);
        query.offset = (page - 1)
            .checked_mul(query.limit)
            .ok_or_else(|| Error::validation("Page out of range"))?;

        Ok(query)
    }

    /// Restrict to listings of `owner`, whatever their status
    pub fn owned_by(mut self, owner: Uuid) -> Self {
        self.owner = Some(owner);
        self.status = None;
        self
    }

    /// Render as a PostgREST request
    pub fn apply(&self, client: PostgrestClient) -> PostgrestClient {
        let columns = if self.category_slug.is_some() {
            LISTING_COLUMNS_BY_CATEGORY
        } else {
            LISTING_COLUMNS
        };
        let mut request = client.select(columns);

        if let Some(status) = self.status {
            request = request.eq("status", status.as_str());
        }
        if let Some(owner) = self.owner {
            request = request.eq("user_id", owner);
        }
        if let Some(slug) = &self.category_slug {
            request = request.eq("categories.slug", slug);
        }
        if let Some(term) = &self.search {
            request = request.or(&substring_any(&["title", "description"], term));
        }
        if let Some(location) = &self.location {
            request = request.ilike("location", &contains_pattern(location));
        }
        if let Some(min_price) = self.min_price {
            request = request.gte("price", min_price);
        }
        if let Some(max_price) = self.max_price {
            request = request.lte("price", max_price);
        }
        if let Some(condition) = self.condition {
            request = request.eq("condition", condition.as_str());
        }
        if self.free_only {
            request = request.eq("is_free", true);
        }

        request = match self.sort {
            ListingSort::Newest => request.order("created_at", SortOrder::Descending),
            ListingSort::Oldest => request.order("created_at", SortOrder::Ascending),
            ListingSort::PriceLowToHigh => request
                .order_nulls_last("price", SortOrder::Ascending)
                .order("created_at", SortOrder::Descending),
            ListingSort::PriceHighToLow => request
                .order_nulls_last("price", SortOrder::Descending)
                .order("created_at", SortOrder::Descending),
        };

        request.offset(self.offset).limit(self.limit)
    }

    /// Whether `listing` satisfies every predicate of this query
    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(status) = self.status {
            if listing.status != status {
                return false;
            }
        }
        if let Some(owner) = self.owner {
            if !listing.is_owned_by(owner) {
                return false;
            }
        }
        if let Some(slug) = &self.category_slug {
            match &listing.categories {
                Some(category) if category.slug == *slug => {}
                _ => return false,
            }
        }
        if let Some(term) = &self.search {
            if !contains_ci(&listing.title, term) && !contains_ci(&listing.description, term) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            match &listing.location {
                Some(value) if contains_ci(value, location) => {}
                _ => return false,
            }
        }
        // A null price never satisfies a bound, as in SQL
        if let Some(min_price) = self.min_price {
            match listing.price {
                Some(price) if price >= min_price => {}
                _ => return false,
            }
        }
        if let Some(max_price) = self.max_price {
            match listing.price {
                Some(price) if price <= max_price => {}
                _ => return false,
            }
        }
        if let Some(condition) = self.condition {
            if listing.condition != Some(condition) {
                return false;
            }
        }
        if self.free_only && !listing.is_free {
            return false;
        }
        true
    }

    /// Ordering of two matching listings under this query's sort
    pub fn compare(&self, a: &Listing, b: &Listing) -> Ordering {
        let newest_first = b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id));
        match self.sort {
            ListingSort::Newest => newest_first,
            ListingSort::Oldest => a
                .created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id)),
            ListingSort::PriceLowToHigh => {
                compare_prices(a.price, b.price, false).then(newest_first)
            }
            ListingSort::PriceHighToLow => compare_prices(a.price, b.price, true).then(newest_first),
        }
    }

    /// Filter, sort and page `listings` in memory
    pub fn run<'a, I>(&self, listings: I) -> Vec<Listing>
    where
        I: IntoIterator<Item = &'a Listing>,
    {
        let mut matching: Vec<&Listing> = listings.into_iter().filter(|l| self.matches(l)).collect();
        matching.sort_by(|a, b| self.compare(a, b));
        matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

/// Query string of the quick search endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

/// Free-text search over title, description and location of active listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub limit: usize,
}

impl SearchQuery {
    pub fn from_params(params: &SearchParams) -> Result<Self> {
        let term = text_term(&params.query)
            .ok_or_else(|| Error::validation("Query parameter is required"))?;
        Ok(Self {
            term,
            limit: SEARCH_RESULT_LIMIT,
        })
    }

    pub fn apply(&self, client: PostgrestClient) -> PostgrestClient {
        client
            .select(LISTING_COLUMNS)
            .eq("status", ListingStatus::Active.as_str())
            .or(&substring_any(
                &["title", "description", "location"],
                &self.term,
            ))
            .order("created_at", SortOrder::Descending)
            .limit(self.limit)
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        listing.status == ListingStatus::Active
            && (contains_ci(&listing.title, &self.term)
                || contains_ci(&listing.description, &self.term)
                || listing
                    .location
                    .as_deref()
                    .is_some_and(|l| contains_ci(l, &self.term)))
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A free-text term; `*` is dropped since PostgREST reads it as a wildcard
fn text_term(value: &Option<String>) -> Option<String> {
    present(value)
        .map(|v| v.replace('*', ""))
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
}

fn parse_price(name: &str, value: &Option<String>) -> Result<Option<f64>> {
    match present(value) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(price) if price.is_finite() => Ok(Some(price)),
            _ => Err(Error::validation(format!("Invalid {}: {}", name, raw))),
        },
        None => Ok(None),
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(Error::validation(format!(
            "Invalid {}: must be a positive integer",
            name
        ))),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::validation(format!("Invalid {}: {}", name, raw))),
    }
}

/// `ilike` pattern matching `term` literally anywhere in the column
fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("*{}*", escaped)
}

/// `col.ilike.*term*` for every column, joined for an `or` group
fn substring_any(columns: &[&str], term: &str) -> String {
    let pattern = quote_filter_value(&contains_pattern(term));
    columns
        .iter()
        .map(|column| format!("{}.ilike.{}", column, pattern))
        .collect::<Vec<_>>()
        .join(",")
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// Null prices sort last in both directions
fn compare_prices(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
