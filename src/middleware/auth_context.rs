use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::gateway::ApiClient;
use crate::models::{AppState, Role, UserProfile};
use crate::notify::Notifier;
use crate::session::{Session, StoreError};

/// The caller's session and toast queue, handed to every authenticated handler.
#[derive(Clone)]
pub struct SessionContext {
    pub session: Session,
    pub notifier: Arc<Notifier>,
}

impl SessionContext {
    /// Look up a live session for a portal access token.
    pub async fn resolve(state: &AppState, access_token: &str) -> Result<Option<Self>, StoreError> {
        let token_hash = hash_access_token(access_token);
        let session = state.sessions.find_by_token_hash(&token_hash).await?;
        Ok(session.map(|session| SessionContext {
            notifier: state.toasts.for_session(session.session_id),
            session,
        }))
    }

    pub fn user(&self) -> &UserProfile {
        &self.session.user
    }

    pub fn role(&self) -> Role {
        self.session.user.role
    }

    /// Backend client authenticated as this session's user.
    pub fn api(&self, state: &AppState) -> ApiClient {
        state.backend.with_token(&self.session.upstream_token)
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notifier.success(message);
    }

    /// Surface the error as a toast and hand it back for the response.
    pub fn reject(&self, err: ApiError) -> ApiError {
        self.notifier.error(err.message());
        err
    }
}

impl FromRequestParts<AppState> for SessionContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Already resolved by the route guard
            if let Some(ctx) = parts.extensions.get::<SessionContext>() {
                return Ok(ctx.clone());
            }

            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            SessionContext::resolve(state, authz.token())
                .await
                .map_err(|e| ApiError::Internal(format!("session store error: {e}")))?
                .ok_or_else(ApiError::session_expired)
        }
    }
}
