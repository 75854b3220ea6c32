use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, is_blank},
    routes::or_empty,
};

pub fn pages() -> Router<AppState> {
    Router::new().route("/super-admin", get(overview))
}

pub fn api() -> Router<AppState> {
    Router::new().route("/clinics", get(list_clinics).post(create_clinic_with_admin))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub clinics: usize,
    pub admins: u64,
    pub patients: u64,
    pub doctors: u64,
}

impl Totals {
    /// Sums numeric counters; rows without them count as zero.
    fn of(clinics: &[Value]) -> Self {
        let sum = |field: &str| clinics.iter().filter_map(|c| c.get(field)?.as_u64()).sum();
        Totals {
            clinics: clinics.len(),
            admins: sum("admins"),
            patients: sum("patients"),
            doctors: sum("doctors"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub clinics: Vec<Value>,
    pub totals: Totals,
}

pub async fn overview(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<Overview>> {
    let clinics: Vec<Value> = or_empty(&ctx, "clinics", ctx.api(&state).get("/super-admin/clinics").await);
    Json(ApiOk::new(Overview {
        totals: Totals::of(&clinics),
        clinics,
    }))
}

pub async fn list_clinics(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let clinics = ctx
        .api(&state)
        .get("/super-admin/clinics")
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load clinics")))?;
    Ok(Json(ApiOk::new(clinics)))
}

/// Read in snake_case like the other portal forms, forwarded in camelCase.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all(deserialize = "snake_case", serialize = "camelCase"))]
pub struct ClinicWithAdminForm {
    pub clinic_name: String,
    pub clinic_code: String,
    pub clinic_email: String,
    pub clinic_phone: String,
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl ClinicWithAdminForm {
    fn is_complete(&self) -> bool {
        [
            &self.clinic_name,
            &self.clinic_code,
            &self.clinic_email,
            &self.clinic_phone,
            &self.admin_name,
            &self.admin_email,
            &self.admin_password,
        ]
        .iter()
        .all(|f| !is_blank(f))
    }
}

pub async fn create_clinic_with_admin(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(form): Json<ClinicWithAdminForm>,
) -> Result<Json<ApiOk<Overview>>, ApiError> {
    if !form.is_complete() {
        return Err(ctx.reject(ApiError::validation("Please fill all fields")));
    }

    let api = ctx.api(&state);
    let _: Value = api
        .post("/super-admin/create-clinic-with-admin", &form)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to create clinic")))?;
    ctx.success("Clinic + Admin created successfully!");
    tracing::info!(clinic = %form.clinic_name, admin = %form.admin_email, "clinic with admin created");

    let clinics: Vec<Value> = or_empty(&ctx, "clinics", api.get("/super-admin/clinics").await);
    Ok(Json(ApiOk::new(Overview {
        totals: Totals::of(&clinics),
        clinics,
    })))
}
