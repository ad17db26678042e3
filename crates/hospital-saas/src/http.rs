//! Request plumbing shared by the workflow routers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::ids::{HospitalId, PrincipalId};
use crate::workflows::ServiceError;

/// Header carrying the authenticated account id, set by the fronting proxy.
pub const PRINCIPAL_HEADER: &str = "x-hospital-user";

fn principal_from(parts: &Parts) -> Option<PrincipalId> {
    parts
        .headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PrincipalId::from)
}

/// Signed-in caller. Missing header is a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub PrincipalId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from(parts)
            .map(CurrentUser)
            .ok_or(ServiceError::Unauthenticated)
    }
}

/// `?hospital=` narrowing used by listing and board endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct HospitalQuery {
    #[serde(default)]
    pub hospital: Option<HospitalId>,
}

/// Wall-clock time in the server's zone.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let (mut parts, _) = Request::builder().body(()).expect("request").into_parts();
        let result = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ServiceError::Unauthenticated)));
    }

    #[tokio::test]
    async fn header_value_is_trimmed() {
        let (mut parts, _) = Request::builder()
            .header(PRINCIPAL_HEADER, " nurse@h1.test ")
            .body(())
            .expect("request")
            .into_parts();
        let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .expect("user");
        assert_eq!(user.as_str(), "nurse@h1.test");
    }
}
