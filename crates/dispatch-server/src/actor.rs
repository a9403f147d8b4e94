//! Caller identity taken from gateway headers.
//!
//! The engine does not authenticate. An upstream gateway does, and passes
//! the result along as:
//!
//! | Header | Meaning |
//! |--------|---------|
//! | `x-user-id` | Authenticated user UUID (required) |
//! | `x-dispatch` | `true` when the user holds dispatch authority |
//! | `x-admin` | `true` when the user holds administrative authority |

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use dispatch_types::{Actor, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the dispatch flag.
pub const DISPATCH_HEADER: &str = "x-dispatch";
/// Header carrying the admin flag.
pub const ADMIN_HEADER: &str = "x-admin";

/// Extractor for the calling [`Actor`].
///
/// Rejects with `401` when `x-user-id` is missing or not a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Self)
    }
}

/// Build an [`Actor`] from gateway headers.
///
/// # Errors
///
/// Returns [`ApiError::Unauthorized`] if the user id is missing or invalid.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
    let user_id: UserId = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;

    Ok(Actor {
        user_id,
        dispatch: flag(headers, DISPATCH_HEADER),
        admin: flag(headers, ADMIN_HEADER),
    })
}

fn flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn reads_flags() {
        let user = UserId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&user.to_string()).unwrap(),
        );
        headers.insert(DISPATCH_HEADER, HeaderValue::from_static("TRUE"));

        let actor = actor_from_headers(&headers).unwrap();
        assert_eq!(actor.user_id, user);
        assert!(actor.dispatch);
        assert!(!actor.admin);
    }

    #[test]
    fn missing_or_bad_user_is_unauthorized() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            actor_from_headers(&headers),
            Err(ApiError::Unauthorized(_))
        ));
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            actor_from_headers(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
