//! Thin PostgREST client for the marketplace service
//!
//! A [`PostgrestClient`] describes exactly one request against one table or
//! view and executes it in a single round trip.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `update`, `delete`)
//! - Filtering (`eq`, `gte`, `ilike`, `or` groups, etc.)
//! - Ordering and pagination
//! - Per-request bearer token so row level security applies to the caller

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Error details PostgREST returns in the body of a failed request
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors raised while building or executing a PostgREST request
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// HTTP status PostgREST answered with, if the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PostgrestError::ApiError { status, .. } => Some(*status),
            PostgrestError::UnparsedApiError { status, .. } => Some(*status),
            PostgrestError::NetworkError(err) => err.status(),
            _ => None,
        }
    }

    /// PostgREST / Postgres error code (e.g. `23503` for a foreign key violation)
    pub fn code(&self) -> Option<&str> {
        match self {
            PostgrestError::ApiError { details, .. } => details.code.as_deref(),
            _ => None,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Parameters that shape the response rather than filter rows
const NON_FILTER_PARAMS: &[&str] = &["select", "order", "limit", "offset"];

/// Characters with a meaning inside an `or=(...)` group
const RESERVED_CHARS: &[char] = &[',', '(', ')', ':', '"', '\\'];

/// Quote a value for use inside a logical filter group.
///
/// Values containing reserved characters are wrapped in double quotes with
/// `"` and `\` escaped, so user input can never add or close predicates.
pub fn quote_filter_value(value: &str) -> String {
    if !value.contains(RESERVED_CHARS) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Request builder and executor for one PostgREST table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    /// Create a client for `table`; the API key doubles as the default bearer token
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(AUTHORIZATION, value);
        }

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        }
    }

    /// Name of the table or view this request targets
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Query parameters in the order they will be sent
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query_params
    }

    /// First value of a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Headers sent with the request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Add a header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Run the request as the user owning `token`
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to return, including embedded resources such as `categories(name,slug)`
    pub fn select(self, columns: &str) -> Self {
        self.set_param("select", columns)
    }

    pub fn eq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "eq", &value.to_string())
    }

    pub fn neq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "neq", &value.to_string())
    }

    pub fn gt<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "gt", &value.to_string())
    }

    pub fn gte<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "gte", &value.to_string())
    }

    pub fn lt<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "lt", &value.to_string())
    }

    pub fn lte<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, "lte", &value.to_string())
    }

    /// Case sensitive pattern match; `*` is the wildcard
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "like", pattern)
    }

    /// Case insensitive pattern match; `*` is the wildcard
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    /// `IS` check against `null`, `true` or `false`
    pub fn is(self, column: &str, value: &str) -> Self {
        self.filter(column, "is", value)
    }

    pub fn in_list<T: ToString>(self, column: &str, values: &[T]) -> Self {
        let values: Vec<String> = values
            .iter()
            .map(|v| quote_filter_value(&v.to_string()))
            .collect();
        self.filter(column, "in", &format!("({})", values.join(",")))
    }

    /// Match rows satisfying any of `filters`, e.g. `title.ilike.*bike*,description.ilike.*bike*`
    pub fn or(mut self, filters: &str) -> Self {
        self.query_params
            .push(("or".to_string(), format!("({})", filters)));
        self
    }

    /// Append an ordering term; earlier calls take precedence
    pub fn order(self, column: &str, order: SortOrder) -> Self {
        self.push_order(format!("{}.{}", column, order.as_str()))
    }

    /// Like [`order`](Self::order) but rows with a null `column` always come last
    pub fn order_nulls_last(self, column: &str, order: SortOrder) -> Self {
        self.push_order(format!("{}.{}.nullslast", column, order.as_str()))
    }

    fn push_order(mut self, term: String) -> Self {
        match self.query_params.iter_mut().find(|(k, _)| k == "order") {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&term);
            }
            None => self.query_params.push(("order".to_string(), term)),
        }
        self
    }

    pub fn limit(self, count: usize) -> Self {
        self.set_param("limit", &count.to_string())
    }

    pub fn offset(self, count: usize) -> Self {
        self.set_param("offset", &count.to_string())
    }

    /// Inclusive row range, zero based
    pub fn range(self, from: usize, to: usize) -> Self {
        let count = to.saturating_sub(from) + 1;
        self.offset(from).limit(count)
    }

    /// Fetch matching rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, None, None).await?;
        Self::parse_rows(response).await
    }

    /// Fetch at most one row
    pub async fn execute_one<T: DeserializeOwned>(self) -> Result<Option<T>, PostgrestError> {
        let rows = self.limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert `values` and return the stored rows
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::POST, Some(body), Some("return=representation"))
            .await?;
        Self::parse_rows(response).await
    }

    /// Apply `values` to the filtered rows and return them as updated
    pub async fn update<T: Serialize, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        self.ensure_filtered("update")?;
        let body = serde_json::to_vec(values)?;
        let response = self
            .send(Method::PATCH, Some(body), Some("return=representation"))
            .await?;
        Self::parse_rows(response).await
    }

    /// Delete the filtered rows and return them
    pub async fn delete<R: DeserializeOwned>(&self) -> Result<Vec<R>, PostgrestError> {
        self.ensure_filtered("delete")?;
        let response = self
            .send(Method::DELETE, None, Some("return=representation"))
            .await?;
        Self::parse_rows(response).await
    }

    /// Full request URL including query parameters
    pub fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn filter(mut self, column: &str, operator: &str, value: &str) -> Self {
        self.query_params
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    fn set_param(mut self, key: &str, value: &str) -> Self {
        match self.query_params.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.query_params.push((key.to_string(), value.to_string())),
        }
        self
    }

    // PostgREST applies an unfiltered PATCH/DELETE to every row of the table
    fn ensure_filtered(&self, operation: &str) -> Result<(), PostgrestError> {
        let filtered = self
            .query_params
            .iter()
            .any(|(k, _)| !NON_FILTER_PARAMS.contains(&k.as_str()));
        if filtered {
            Ok(())
        } else {
            Err(PostgrestError::InvalidParameters(format!(
                "refusing to {} {} without a filter",
                operation, self.table
            )))
        }
    }

    async fn send(
        &self,
        method: Method,
        body: Option<Vec<u8>>,
        prefer: Option<&'static str>,
    ) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        log::debug!("{} {}", method, url);

        let mut headers = self.headers.clone();
        if let Some(prefer) = prefer {
            headers.insert(
                HeaderName::from_static("prefer"),
                HeaderValue::from_static(prefer),
            );
        }

        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(PostgrestError::NetworkError)?;
        Ok(response)
    }

    async fn parse_rows<R: DeserializeOwned>(response: Response) -> Result<Vec<R>, PostgrestError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            return match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
                Ok(details) => Err(PostgrestError::ApiError { details, status }),
                Err(_) => Err(PostgrestError::UnparsedApiError {
                    message: error_text,
                    status,
                }),
            };
        }

        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        // 204 No Content, or `return=minimal` configured server side
        if body_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<R>>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, Client::new())
    }

    #[test]
    fn test_quote_filter_value() {
        assert_eq!(quote_filter_value("*bike*"), "*bike*");
        assert_eq!(quote_filter_value("*a,b*"), "\"*a,b*\"");
        assert_eq!(quote_filter_value("x)y"), "\"x)y\"");
        assert_eq!(quote_filter_value("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_repeated_column_filters_are_kept() {
        let client = PostgrestClient::new("http://localhost:54321", "k", "listings", Client::new())
            .gte("price", 10)
            .lte("price", 50);

        let prices: Vec<&str> = client
            .query_pairs()
            .iter()
            .filter(|(k, _)| k == "price")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(prices, vec!["gte.10", "lte.50"]);
    }

    #[test]
    fn test_order_terms_accumulate() {
        let client = PostgrestClient::new("http://localhost:54321", "k", "listings", Client::new())
            .order_nulls_last("price", SortOrder::Descending)
            .order("created_at", SortOrder::Descending);
        assert_eq!(client.param("order"), Some("price.desc.nullslast,created_at.desc"));
    }

    #[test]
    fn test_range_translates_to_offset_and_limit() {
        let client = PostgrestClient::new("http://localhost:54321", "k", "listings", Client::new())
            .range(20, 39);
        assert_eq!(client.param("offset"), Some("20"));
        assert_eq!(client.param("limit"), Some("20"));
    }

    #[test]
    fn test_build_url_encodes_params() {
        let client = PostgrestClient::new("http://localhost:54321/", "k", "listings", Client::new())
            .select("*")
            .ilike("location", "*st paul*");
        let url = client.build_url().unwrap();
        assert_eq!(url.path(), "/rest/v1/listings");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("location".to_string(), "ilike.*st paul*".to_string())));
    }

    #[tokio::test]
    async fn test_select_with_filters() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .and(query_param("select", "*"))
            .and(query_param("status", "eq.active"))
            .and(query_param("price", "gte.10"))
            .and(query_param("price", "lte.50"))
            .and(query_param("or", "(title.ilike.*bike*,description.ilike.*bike*)"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "title": "Bike" }
            ])))
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server, "listings")
            .select("*")
            .eq("status", "active")
            .gte("price", 10)
            .lte("price", 50)
            .or("title.ilike.*bike*,description.ilike.*bike*")
            .order("created_at", SortOrder::Descending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Bike");
    }

    #[tokio::test]
    async fn test_execute_one_returns_none_for_no_rows() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let row = client(&mock_server, "profiles")
            .eq("id", "abc")
            .execute_one::<Value>()
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_insert_returns_representation() {
        let mock_server = MockServer::start().await;
        let payload = json!({ "listing_id": "l1", "user_id": "u1" });

        Mock::given(method("POST"))
            .and(path("/rest/v1/favorites"))
            .and(header("prefer", "return=representation"))
            .and(header("authorization", "Bearer user-token"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "f1", "listing_id": "l1", "user_id": "u1" }
            ])))
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client(&mock_server, "favorites")
            .with_auth("user-token")
            .unwrap()
            .insert(&payload)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "f1");
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/favorites"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client(&mock_server, "favorites")
            .eq("user_id", "u1")
            .delete()
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unfiltered_update_is_refused() {
        let result: Result<Vec<Value>, _> =
            PostgrestClient::new("http://localhost:54321", "k", "listings", Client::new())
                .select("*")
                .update(&json!({ "title": "x" }))
                .await;

        assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_api_error_is_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23503",
                "message": "insert or update on table \"listings\" violates foreign key constraint",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "listings")
            .insert::<_, Value>(&json!({ "title": "x" }))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert_eq!(err.code(), Some("23503"));
    }

    #[tokio::test]
    async fn test_unparsed_error_keeps_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/listings"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "listings")
            .execute::<Value>()
            .await
            .unwrap_err();

        match err {
            PostgrestError::UnparsedApiError { message, status } => {
                assert_eq!(message, "bad gateway");
                assert_eq!(status, StatusCode::BAD_GATEWAY);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
