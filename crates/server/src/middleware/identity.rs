//! Caller identity extractor.
//!
//! Authentication happens upstream; the auth proxy forwards the
//! authenticated user's ID in the `x-user-id` header.

use axum::{extract::FromRequestParts, http::request::Parts};

use marketboard_core::UserId;

use crate::error::AppError;

/// The HTTP header carrying the authenticated user's ID.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that requires an authenticated user.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
///     format!("Hello, user {user_id}!")
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing user identity".to_string()))?;

        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Unauthorized("malformed user identity".to_string()))?;

        Ok(Self(UserId::new(id)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(value: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/api/me/quota");
        if let Some(value) = value {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_reads_user_id() {
        let user = extract(Some("42")).await.unwrap();
        assert_eq!(user, CurrentUser(UserId::new(42)));
    }

    #[tokio::test]
    async fn test_rejects_missing_or_malformed() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("abc")).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(Some("-3")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
