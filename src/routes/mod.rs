use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::appointments::WorkflowError;
use crate::error::ApiError;
use crate::gateway::GatewayError;
use crate::middleware::auth_context::SessionContext;
use crate::middleware::guard::{self, guarded};
use crate::models::AppState;

pub mod auth_routes;
pub mod billing_routes;
pub mod chatbot_routes;
pub mod clinic_routes;
pub mod doctor_routes;
pub mod home_routes;
pub mod patient_routes;
pub mod receptionist_routes;
pub mod super_admin_routes;
pub mod toast_routes;

pub fn router(state: AppState) -> Router {
    let s = &state;
    Router::new()
        .merge(home_routes::router())
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/toasts", toast_routes::router())
        // pages
        .merge(guarded(doctor_routes::pages(), s, guard::DOCTOR))
        .merge(guarded(patient_routes::pages(), s, guard::PATIENT))
        .merge(guarded(receptionist_routes::pages(), s, guard::RECEPTIONIST))
        .merge(guarded(clinic_routes::dashboard_pages(), s, guard::ADMINS))
        .merge(guarded(clinic_routes::admin_pages(), s, guard::CLINIC_ADMIN))
        .merge(guarded(super_admin_routes::pages(), s, guard::SYSTEM_ADMIN))
        .merge(guarded(chatbot_routes::pages(), s, guard::ANY_ROLE))
        // api
        .nest("/api/v1/patient", guarded(patient_routes::api(), s, guard::PATIENT))
        .nest("/api/v1/doctor", guarded(doctor_routes::api(), s, guard::DOCTOR))
        .nest(
            "/api/v1/receptionist",
            guarded(receptionist_routes::api(), s, guard::RECEPTIONIST),
        )
        .nest(
            "/api/v1/clinic-admin",
            guarded(clinic_routes::admin_api(), s, guard::CLINIC_ADMIN),
        )
        .nest("/api/v1/clinics", guarded(clinic_routes::clinics_api(), s, guard::ADMINS))
        .nest(
            "/api/v1/super-admin",
            guarded(super_admin_routes::api(), s, guard::SYSTEM_ADMIN),
        )
        .nest("/api/v1/billing", guarded(billing_routes::api(), s, guard::BILLING))
        .nest("/api/v1/chatbot", guarded(chatbot_routes::api(), s, guard::ANY_ROLE))
        .with_state(state)
}

/* -------------------------
   Shared handler helpers
--------------------------*/

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub confirmed: bool,
}

/// A page list that failed to load renders empty, with an error toast.
pub(crate) fn or_empty<T: Default>(ctx: &SessionContext, what: &str, res: Result<T, GatewayError>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, list = what, "page list failed to load");
            ctx.notifier.error(format!("Failed to load {what}"));
            T::default()
        }
    }
}

/// Toast a workflow failure (except the cancel prompt) and turn it into a response.
pub(crate) fn workflow_failed(ctx: &SessionContext, e: WorkflowError) -> ApiError {
    if e.is_toast() {
        ctx.reject(e.into())
    } else {
        e.into()
    }
}

/// Case-insensitive match on a string field of a plain JSON record.
pub(crate) fn field_contains(record: &Value, field: &str, needle: &str) -> bool {
    record
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|v| v.to_lowercase().contains(needle))
}

/// Backend ids may be numbers or strings.
pub(crate) fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
