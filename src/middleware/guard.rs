//! Role-based route guard.
//!
//! Every guarded route group declares the roles it admits. The guard resolves
//! the bearer token to a session on each request and either lets the request
//! through (with the [`SessionContext`] attached) or redirects to `/login`.
//! Missing token, unknown or expired session and wrong role all look the same.

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::middleware::auth_context::SessionContext;
use crate::models::{AppState, Role};
use crate::session::Session;

pub const LOGIN_PATH: &str = "/login";

pub const DOCTOR: &[Role] = &[Role::Doctor];
pub const PATIENT: &[Role] = &[Role::Patient];
pub const RECEPTIONIST: &[Role] = &[Role::Receptionist];
pub const CLINIC_ADMIN: &[Role] = &[Role::ClinicAdmin];
pub const SYSTEM_ADMIN: &[Role] = &[Role::SystemAdmin];
pub const ADMINS: &[Role] = &[Role::SystemAdmin, Role::ClinicAdmin];
pub const BILLING: &[Role] = &[Role::Patient, Role::Receptionist, Role::ClinicAdmin];
pub const ANY_ROLE: &[Role] = &Role::ALL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectToLogin,
}

pub fn evaluate(allow: &[Role], session: Option<&Session>) -> Decision {
    match session {
        Some(s) if !s.upstream_token.is_empty() && allow.contains(&s.user.role) => Decision::Allow,
        _ => Decision::RedirectToLogin,
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    state: AppState,
    allow: &'static [Role],
}

pub async fn require_roles(State(guard): State<RouteGuard>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|authz| authz.token().to_string());

    let ctx = match token {
        Some(token) => match SessionContext::resolve(&guard.state, &token).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                None
            }
        },
        None => None,
    };

    match evaluate(guard.allow, ctx.as_ref().map(|c| &c.session)) {
        Decision::Allow => {
            if let Some(ctx) = ctx {
                req.extensions_mut().insert(ctx);
            }
            next.run(req).await
        }
        Decision::RedirectToLogin => {
            tracing::debug!(path = %req.uri().path(), "guard redirect to login");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}

/// Wrap every route of `router` in the guard for `allow`.
pub fn guarded(router: Router<AppState>, state: &AppState, allow: &'static [Role]) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        RouteGuard {
            state: state.clone(),
            allow,
        },
        require_roles,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session(role: Role, upstream_token: &str) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            token_hash: "h".into(),
            upstream_token: upstream_token.into(),
            user: UserProfile {
                id: "u1".into(),
                name: "Ada".into(),
                email: "ada@clinic.test".into(),
                phone: None,
                role,
            },
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(DOCTOR, None), Decision::RedirectToLogin);
        assert_eq!(evaluate(DOCTOR, Some(&session(Role::Doctor, "t"))), Decision::Allow);
        assert_eq!(evaluate(DOCTOR, Some(&session(Role::Patient, "t"))), Decision::RedirectToLogin);
        assert_eq!(evaluate(DOCTOR, Some(&session(Role::Doctor, ""))), Decision::RedirectToLogin);
        assert_eq!(evaluate(ADMINS, Some(&session(Role::ClinicAdmin, "t"))), Decision::Allow);
        assert_eq!(evaluate(ADMINS, Some(&session(Role::SystemAdmin, "t"))), Decision::Allow);
        assert_eq!(evaluate(&[], Some(&session(Role::SystemAdmin, "t"))), Decision::RedirectToLogin);
    }

    #[test]
    fn test_any_role_admits_everyone() {
        for role in Role::ALL {
            assert_eq!(evaluate(ANY_ROLE, Some(&session(role, "t"))), Decision::Allow);
        }
    }
}
