use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    gateway::GatewayError,
    middleware::{auth_context::SessionContext, guard::LOGIN_PATH},
    models::{ApiOk, AppState, Role, UserProfile, is_blank},
    session,
};

pub const SIGNUP_FAILED: &str = "Signup failed. Email may already exist.";
pub const NO_VERIFY_TOKEN: &str = "No verification token provided.";
pub const VERIFIED: &str = "Email verified successfully! You can now log in.";
pub const VERIFY_FAILED: &str = "Verification failed. The token may be invalid or expired.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/verify-email", get(verify_email))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

/* -------------------------
   Login
--------------------------*/

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// The login tab the user picked.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
struct UpstreamLogin<'a> {
    email: &'a str,
    password: &'a str,
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamSession {
    access_token: Option<String>,
    user: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
    pub redirect: &'static str,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiOk<LoginResponse>>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }
    let selected = req.role.unwrap_or(Role::Doctor);

    let upstream: Result<UpstreamSession, GatewayError> = state
        .backend
        .post(
            "/auth/login",
            &UpstreamLogin {
                email,
                password: &req.password,
                role: selected,
            },
        )
        .await;

    let (upstream_token, user) = match upstream {
        Ok(UpstreamSession {
            access_token: Some(token),
            user: Some(user),
        }) if !is_blank(&token) => (token, user),
        Ok(_) => {
            tracing::warn!(%email, "login response carried no token");
            return Err(ApiError::invalid_credentials());
        }
        Err(e) => {
            tracing::info!(%email, error = %e, "login rejected upstream");
            return Err(ApiError::invalid_credentials());
        }
    };

    if user.role != selected {
        tracing::info!(%email, selected = %selected, actual = %user.role, "login role mismatch");
        return Err(ApiError::Forbidden(
            "ROLE_MISMATCH",
            format!("Please select the correct role: {}", user.role),
        ));
    }

    let (access_token, session) =
        session::open(state.sessions.as_ref(), state.session_ttl_hours, upstream_token, user)
            .await
            .map_err(|e| ApiError::Internal(format!("session store error: {e}")))?;

    state
        .toasts
        .for_session(session.session_id)
        .success(format!("Welcome, {}", session.user.name));

    tracing::info!(user_id = %session.user.id, role = %session.user.role, "login");

    Ok(Json(ApiOk::new(LoginResponse {
        access_token,
        expires_at: session.expires_at,
        redirect: session.user.role.landing_path(),
        user: session.user,
    })))
}

/* -------------------------
   Register / verify
--------------------------*/

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpstreamRegister<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse<T> {
    pub message: String,
    pub result: T,
    pub redirect: &'static str,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiOk<RedirectResponse<Value>>>, ApiError> {
    if is_blank(&req.name) || is_blank(&req.email) || req.password.is_empty() {
        return Err(ApiError::validation("Name, email and password are required"));
    }

    let body = UpstreamRegister {
        name: req.name.trim(),
        email: req.email.trim(),
        password: &req.password,
        role: req.role.unwrap_or(Role::Patient),
        phone: req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()),
    };

    let result: Value = state
        .backend
        .post("/auth/register", &body)
        .await
        .map_err(|e| ApiError::upstream(e, SIGNUP_FAILED))?;

    tracing::info!(email = %body.email, role = %body.role, "registered");

    Ok(Json(ApiOk::new(RedirectResponse {
        message: "Signup successful!".into(),
        result,
        redirect: LOGIN_PATH,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(q): Query<VerifyQuery>,
) -> Result<Json<ApiOk<RedirectResponse<Value>>>, ApiError> {
    let token = q
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("MISSING_TOKEN", NO_VERIFY_TOKEN.into()))?;

    let result: Value = state
        .backend
        .get_query("/auth/verify-email", &[("token", token)])
        .await
        .map_err(|e| ApiError::upstream(e, VERIFY_FAILED))?;

    let message = result
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !is_blank(m))
        .unwrap_or(VERIFIED)
        .to_string();

    Ok(Json(ApiOk::new(RedirectResponse {
        message,
        result,
        redirect: LOGIN_PATH,
    })))
}

/* -------------------------
   Session
--------------------------*/

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
    pub landing_path: &'static str,
}

pub async fn me(ctx: SessionContext) -> Json<ApiOk<MeResponse>> {
    Json(ApiOk::new(MeResponse {
        landing_path: ctx.role().landing_path(),
        expires_at: ctx.session.expires_at,
        user: ctx.session.user,
    }))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
    pub redirect: &'static str,
}

pub async fn logout(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<LogoutResponse>>, ApiError> {
    let session_id = ctx.session.session_id;
    let revoked = state
        .sessions
        .revoke(session_id)
        .await
        .map_err(|e| ApiError::Internal(format!("session store error: {e}")))?;
    state.toasts.drop_session(session_id);

    tracing::info!(user_id = %ctx.user().id, "logout");

    Ok(Json(ApiOk::new(LogoutResponse {
        revoked,
        redirect: LOGIN_PATH,
    })))
}
