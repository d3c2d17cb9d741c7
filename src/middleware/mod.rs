use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Role, User};
use crate::services::auth::TokenType;
use crate::AppState;

const AUTH_REQUIRED: &str = "Authentication required";

/// The caller behind a valid access token. Always an existing, active user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

/// An authenticated caller with the corper role.
#[derive(Debug, Clone)]
pub struct CorperUser(pub User);

/// An authenticated caller with the vendor role.
#[derive(Debug, Clone)]
pub struct VendorUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// Bearer JWT extractor
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let unauthorized = || ApiError::Unauthorized(AUTH_REQUIRED.to_string());

        let token = bearer_token(parts).ok_or_else(unauthorized)?;
        let claims = state
            .tokens
            .decode(token, TokenType::Access)
            .map_err(|_| unauthorized())?;

        let user = User::find_by_id(&state.db.pool, claims.sub)
            .await
            .map_err(|e| {
                tracing::error!("auth user lookup failed: {:?}", e);
                ApiError::Database(e)
            })?
            .filter(|user| user.is_active)
            .ok_or_else(unauthorized)?;

        Ok(AuthUser { user })
    }
}

async fn with_role(
    parts: &mut Parts,
    state: &Arc<AppState>,
    role: Role,
    message: &str,
) -> Result<User, ApiError> {
    let AuthUser { user } = AuthUser::from_request_parts(parts, state).await?;
    if user.role != role {
        return Err(ApiError::Forbidden(message.to_string()));
    }
    Ok(user)
}

impl FromRequestParts<Arc<AppState>> for CorperUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        with_role(parts, state, Role::Corper, "Only corpers are allowed here")
            .await
            .map(CorperUser)
    }
}

impl FromRequestParts<Arc<AppState>> for VendorUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        with_role(parts, state, Role::Vendor, "Only vendors are allowed here")
            .await
            .map(VendorUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/auth/user/me");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def.ghi"))), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&parts_with(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
