//! Configuration options for the marketplace service

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::query::QueryLimits;

/// Where listings, messages and profiles are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// The hosted PostgREST API
    Supabase,
    /// Process memory, for local development
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Error::config(format!("unknown store backend: {}", other))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Supabase => write!(f, "supabase"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Configuration options for the marketplace service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the Supabase project
    pub supabase_url: String,

    /// Anonymous API key of the Supabase project
    pub supabase_anon_key: String,

    /// Project JWT secret; when set, access tokens are verified locally
    pub jwt_secret: Option<String>,

    pub host: String,

    pub port: u16,

    pub store: StoreBackend,

    /// Listings per page when the request does not say
    pub default_page_size: usize,

    /// Upper bound for the `limit` query parameter
    pub max_page_size: usize,

    /// Days until a new listing expires
    pub listing_ttl_days: i64,

    /// Timeout for requests to the backend
    pub request_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: String::new(),
            jwt_secret: None,
            host: "0.0.0.0".to_string(),
            port: 3000,
            store: StoreBackend::Supabase,
            default_page_size: 20,
            max_page_size: 100,
            listing_ttl_days: 30,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("SUPABASE_URL") {
            config.supabase_url = url;
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            config.supabase_anon_key = key;
        }
        config.jwt_secret = get("SUPABASE_JWT_SECRET");
        if let Some(host) = get("MARKETPLACE_HOST") {
            config.host = host;
        }
        if let Some(port) = get("MARKETPLACE_PORT") {
            config.port = parse_var("MARKETPLACE_PORT", &port)?;
        }
        if let Some(store) = get("MARKETPLACE_STORE") {
            config.store = store.parse()?;
        }
        if let Some(size) = get("MARKETPLACE_PAGE_SIZE") {
            config.default_page_size = parse_var("MARKETPLACE_PAGE_SIZE", &size)?;
        }
        if let Some(size) = get("MARKETPLACE_MAX_PAGE_SIZE") {
            config.max_page_size = parse_var("MARKETPLACE_MAX_PAGE_SIZE", &size)?;
        }
        if let Some(days) = get("MARKETPLACE_LISTING_TTL_DAYS") {
            config.listing_ttl_days = parse_var("MARKETPLACE_LISTING_TTL_DAYS", &days)?;
        }
        if let Some(secs) = get("MARKETPLACE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_var("MARKETPLACE_REQUEST_TIMEOUT_SECS", &secs)?;
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the options are usable together
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.supabase_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config("SUPABASE_URL must be an http(s) URL"));
        }
        if self.store == StoreBackend::Supabase && self.supabase_anon_key.is_empty() {
            return Err(Error::config(
                "SUPABASE_ANON_KEY must be set when using the supabase store",
            ));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(Error::config("page sizes must be positive"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(Error::config(
                "MARKETPLACE_PAGE_SIZE cannot exceed MARKETPLACE_MAX_PAGE_SIZE",
            ));
        }
        if self.listing_ttl_days <= 0 {
            return Err(Error::config("MARKETPLACE_LISTING_TTL_DAYS must be positive"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address: {}", e)))
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    pub fn with_supabase(mut self, url: &str, anon_key: &str) -> Self {
        self.supabase_url = url.to_string();
        self.supabase_anon_key = anon_key.to_string();
        self
    }

    pub fn with_jwt_secret(mut self, secret: &str) -> Self {
        self.jwt_secret = Some(secret.to_string());
        self
    }

    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }

    pub fn with_page_sizes(mut self, default_page_size: usize, max_page_size: usize) -> Self {
        self.default_page_size = default_page_size;
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_listing_ttl_days(mut self, days: i64) -> Self {
        self.listing_ttl_days = days;
        self
    }

    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{}: {}", key, e)))
}
