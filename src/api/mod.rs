//! HTTP API handlers.

pub mod bookings;
pub mod jobs;
pub mod listings;
pub mod payments;

use crate::error::Error;
use crate::types::UserId;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Header carrying the authenticated user's id. Populated by the gateway in
/// front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, extracted from [`USER_ID_HEADER`].
#[derive(Clone, Copy, Debug)]
pub struct Actor(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(Error::Unauthorized)?;
        Ok(Self(UserId::from_uuid(user_id)))
    }
}
