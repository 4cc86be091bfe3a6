//! Request identity extractors
//!
//! The bearer access token is resolved through the auth client in
//! [`AppState`]; the resulting [`Identity`] keeps the token so the store can
//! act as the caller.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use marketplace_auth::bearer_token;

use super::AppState;
use crate::error::{Error, Result};
use crate::store::Identity;

/// A caller that must be signed in
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

/// A caller that may be anonymous
///
/// A missing `Authorization` header means anonymous; a header carrying a bad
/// token is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Identity>);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match identify(parts, state).await? {
            Some(identity) => Ok(AuthUser(identity)),
            None => Err(Error::unauthorized("Unauthorized")),
        }
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        Ok(MaybeUser(identify(parts, state).await?))
    }
}

async fn identify(parts: &Parts, state: &AppState) -> Result<Option<Identity>> {
    let header = match parts.headers.get(AUTHORIZATION) {
        Some(header) => header,
        None => return Ok(None),
    };
    let token = header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| Error::unauthorized("Unauthorized"))?;

    let user = state.auth.authenticate(token).await?;
    Ok(Some(Identity::new(user, token)))
}
