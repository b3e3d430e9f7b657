//! Bearer-token authentication middleware.
//!
//! Two token classes exist: per-tenant client tokens (hashed with SHA-256 and
//! looked up through an [`AuthStore`]) and a single admin token from
//! configuration. The middleware resolves the token to an [`Identity`] and
//! stores it in request extensions; handlers pull it back out with the
//! [`Identity`] extractor.

use crate::errors::AppError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Role resolved from the presented bearer token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthRole {
    /// Tenant-scoped token: agents and operators of one client.
    Client,
    /// System operator across tenants.
    Admin,
}

/// Authenticated caller identity, inserted into request extensions.
#[derive(Clone, Debug)]
pub struct Identity {
    /// The tenant this caller belongs to; `None` for the admin token.
    pub client_id: Option<Uuid>,
    pub role: AuthRole,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == AuthRole::Admin
    }

    /// The tenant id, or Forbidden for admin tokens on tenant-scoped routes.
    pub fn require_client_id(&self) -> Result<Uuid, AppError> {
        self.client_id
            .ok_or_else(|| AppError::Forbidden("This endpoint requires a client token".to_string()))
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "This endpoint requires the admin token".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| {
                AppError::Unauthorized("Authentication required".to_string()).into_response()
            })
    }
}

/// Token lookup backend for client tokens.
#[async_trait::async_trait]
pub trait AuthStore: Send + Sync {
    /// Resolve a SHA-256 token hash (lowercase hex) to a client id.
    async fn client_id_for_token_hash(&self, token_hash: &str) -> Result<Option<Uuid>, String>;
}

/// Shared state for the bearer-token middleware.
#[derive(Clone)]
pub struct AuthState {
    store: Arc<dyn AuthStore>,
    admin_token_hash: String,
}

impl AuthState {
    /// `admin_token` is the raw configured token; it is hashed once here and
    /// only the hash is kept in memory.
    pub fn new(store: Arc<dyn AuthStore>, admin_token: &str) -> Self {
        Self {
            store,
            admin_token_hash: hash_token(admin_token),
        }
    }
}

/// Hash a bearer token with SHA-256, returning lowercase hex.
///
/// Tokens are never stored or compared in the clear.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Bearer-token authentication middleware.
///
/// Apply with `axum::middleware::from_fn_with_state(auth_state, bearer_auth)`.
pub async fn bearer_auth(
    State(auth): State<AuthState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match &bearer {
        Some(TypedHeader(authorization)) => authorization.token().trim(),
        None => {
            return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
        }
    };
    if token.is_empty() {
        return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
    }

    let token_hash = hash_token(token);

    let identity = if token_hash == auth.admin_token_hash {
        Identity {
            client_id: None,
            role: AuthRole::Admin,
        }
    } else {
        match auth.store.client_id_for_token_hash(&token_hash).await {
            Ok(Some(client_id)) => Identity {
                client_id: Some(client_id),
                role: AuthRole::Client,
            },
            Ok(None) => {
                return AppError::Unauthorized("Invalid bearer token".to_string()).into_response();
            }
            Err(e) => {
                tracing::error!("Auth store lookup failed: {}", e);
                return AppError::ServiceUnavailable("Authentication unavailable".to_string())
                    .into_response();
            }
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Admin gate for routes nested under the admin surface. Relies on
/// [`bearer_auth`] having resolved the identity further out.
pub async fn require_admin(identity: Identity, request: Request, next: Next) -> Response {
    if let Err(e) = identity.require_admin() {
        return e.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("fleet-token");
        let b = hash_token("fleet-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_token_differs_per_token() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn test_identity_require_admin() {
        let admin = Identity {
            client_id: None,
            role: AuthRole::Admin,
        };
        assert!(admin.require_admin().is_ok());

        let client = Identity {
            client_id: Some(Uuid::now_v7()),
            role: AuthRole::Client,
        };
        assert!(client.require_admin().is_err());
        assert!(client.require_client_id().is_ok());
        assert!(admin.require_client_id().is_err());
    }
}
