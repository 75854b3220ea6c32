// Clinic administration: the shared clinics dashboard and the clinic admin's own clinic.

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    gateway::{ApiClient, GatewayError},
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, UserProfile, is_blank},
    routes::{or_empty, record_id},
};

pub const REQUIRED_FIELDS: &str = "Please fill in all required fields";
pub const CLINIC_NOT_LOADED: &str = "Clinic information not loaded";

pub fn dashboard_pages() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

pub fn admin_pages() -> Router<AppState> {
    Router::new()
        .route("/admin-dashboard", get(admin_dashboard))
        .route("/admin-dashboard/doctors", get(doctors_page))
        .route("/admin-dashboard/receptionists", get(receptionists_page))
}

/// `/api/v1/clinics`, shared by both admin roles.
pub fn clinics_api() -> Router<AppState> {
    Router::new().route("/", get(list_clinics).post(add_clinic))
}

/// `/api/v1/clinic-admin`, scoped to the admin's own clinic.
pub fn admin_api() -> Router<AppState> {
    Router::new()
        .route("/clinic", get(get_my_clinic))
        .route("/doctors", get(list_doctors).post(add_doctor))
        .route("/receptionists", get(list_receptionists).post(add_receptionist))
        .route("/patients", get(list_patients))
        .route("/appointments", get(list_appointments))
        .route("/bills", get(list_bills))
}

/* -------------------------
   Clinics dashboard
--------------------------*/

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClinicForm {
    pub name: String,
    pub location: String,
    pub contact: String,
}

impl ClinicForm {
    fn validate(&self) -> Result<Value, ApiError> {
        if is_blank(&self.name) || is_blank(&self.location) || is_blank(&self.contact) {
            return Err(ApiError::validation(REQUIRED_FIELDS));
        }
        Ok(serde_json::json!({
            "name": self.name.trim(),
            "location": self.location.trim(),
            "contact": self.contact.trim(),
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct ClinicsDashboard {
    pub user: UserProfile,
    pub clinics: Vec<Value>,
}

pub async fn dashboard(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<ClinicsDashboard>> {
    let clinics = or_empty(&ctx, "clinics", ctx.api(&state).get("/clinics").await);
    Json(ApiOk::new(ClinicsDashboard {
        user: ctx.user().clone(),
        clinics,
    }))
}

pub async fn list_clinics(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let clinics = ctx
        .api(&state)
        .get("/clinics")
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load clinics")))?;
    Ok(Json(ApiOk::new(clinics)))
}

pub async fn add_clinic(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(form): Json<ClinicForm>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let body = form.validate().map_err(|e| ctx.reject(e))?;
    let api = ctx.api(&state);

    let _: Value = api
        .post("/clinics", &body)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to add clinic. Please try again.")))?;
    ctx.success("Clinic added successfully!");
    tracing::info!(name = %form.name.trim(), "clinic added");

    let clinics = or_empty(&ctx, "clinics", api.get("/clinics").await);
    Ok(Json(ApiOk::new(clinics)))
}

/* -------------------------
   Own clinic
--------------------------*/

async fn my_clinic(api: &ApiClient) -> Result<(String, Value), GatewayError> {
    let clinic: Value = api.get("/clinics/my-clinic").await?;
    let id = record_id(&clinic).ok_or_else(|| GatewayError::Decode("clinic without id".into()))?;
    Ok((id, clinic))
}

/// Resolve the admin's clinic id, or fail with the "not loaded" message.
async fn clinic_id(api: &ApiClient, ctx: &SessionContext) -> Result<String, ApiError> {
    match my_clinic(api).await {
        Ok((id, _)) => Ok(id),
        Err(e) => {
            tracing::warn!(error = %e, "clinic lookup failed");
            Err(ctx.reject(ApiError::BadRequest("CLINIC_NOT_LOADED", CLINIC_NOT_LOADED.into())))
        }
    }
}

async fn clinic_list(state: &AppState, ctx: &SessionContext, what: &'static str) -> Result<Vec<Value>, ApiError> {
    let api = ctx.api(state);
    let id = clinic_id(&api, ctx).await?;
    api.get(&format!("/clinics/{id}/{what}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, &format!("Failed to load {what}"))))
}

#[derive(Debug, Default, Serialize)]
pub struct ClinicCounts {
    pub doctors: usize,
    pub patients: usize,
    pub receptionists: usize,
    pub appointments: usize,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub user: UserProfile,
    pub clinic: Option<Value>,
    pub counts: ClinicCounts,
}

pub async fn admin_dashboard(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<AdminDashboard>> {
    let api = ctx.api(&state);
    let (id, clinic) = match my_clinic(&api).await {
        Ok((id, clinic)) => (id, clinic),
        Err(e) => {
            tracing::warn!(error = %e, "clinic lookup failed");
            ctx.notifier.error("Failed to load clinic");
            return Json(ApiOk::new(AdminDashboard {
                user: ctx.user().clone(),
                clinic: None,
                counts: ClinicCounts::default(),
            }));
        }
    };

    let path = |what: &str| format!("/clinics/{id}/{what}");
    let (doctors_path, patients_path, receptionists_path, appointments_path) =
        (path("doctors"), path("patients"), path("receptionists"), path("appointments"));
    let (doctors, patients, receptionists, appointments) = tokio::join!(
        api.get::<Vec<Value>>(&doctors_path),
        api.get::<Vec<Value>>(&patients_path),
        api.get::<Vec<Value>>(&receptionists_path),
        api.get::<Vec<Value>>(&appointments_path),
    );

    Json(ApiOk::new(AdminDashboard {
        user: ctx.user().clone(),
        clinic: Some(clinic),
        counts: ClinicCounts {
            doctors: or_empty(&ctx, "doctors", doctors).len(),
            patients: or_empty(&ctx, "patients", patients).len(),
            receptionists: or_empty(&ctx, "receptionists", receptionists).len(),
            appointments: or_empty(&ctx, "appointments", appointments).len(),
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct StaffPage {
    pub staff: Vec<Value>,
}

async fn staff_page(state: &AppState, ctx: &SessionContext, what: &'static str) -> Json<ApiOk<StaffPage>> {
    let api = ctx.api(state);
    let staff = match my_clinic(&api).await {
        Ok((id, _)) => or_empty(ctx, what, api.get(&format!("/clinics/{id}/{what}")).await),
        Err(e) => or_empty(ctx, "clinic", Err::<Vec<Value>, _>(e)),
    };
    Json(ApiOk::new(StaffPage { staff }))
}

pub async fn doctors_page(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<StaffPage>> {
    staff_page(&state, &ctx, "doctors").await
}

pub async fn receptionists_page(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<StaffPage>> {
    staff_page(&state, &ctx, "receptionists").await
}

pub async fn get_my_clinic(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<ApiOk<Value>>, ApiError> {
    let (_, clinic) = my_clinic(&ctx.api(&state))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load clinic")))?;
    Ok(Json(ApiOk::new(clinic)))
}

pub async fn list_doctors(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    Ok(Json(ApiOk::new(clinic_list(&state, &ctx, "doctors").await?)))
}

pub async fn list_receptionists(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    Ok(Json(ApiOk::new(clinic_list(&state, &ctx, "receptionists").await?)))
}

pub async fn list_patients(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    Ok(Json(ApiOk::new(clinic_list(&state, &ctx, "patients").await?)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    Ok(Json(ApiOk::new(clinic_list(&state, &ctx, "appointments").await?)))
}

pub async fn list_bills(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let api = ctx.api(&state);
    let id = clinic_id(&api, &ctx).await?;
    let bills = api
        .get(&format!("/billing/clinic/{id}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load bills")))?;
    Ok(Json(ApiOk::new(bills)))
}

/* -------------------------
   Staff
--------------------------*/

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StaffForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    /// Doctors only.
    pub speciality_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StaffPayload<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    speciality_ids: &'a [String],
}

#[derive(Debug, Clone, Copy)]
enum StaffKind {
    Doctor,
    Receptionist,
}

impl StaffKind {
    fn endpoint(self) -> &'static str {
        match self {
            StaffKind::Doctor => "doctor",
            StaffKind::Receptionist => "receptionist",
        }
    }

    fn list(self) -> &'static str {
        match self {
            StaffKind::Doctor => "doctors",
            StaffKind::Receptionist => "receptionists",
        }
    }

    fn label(self) -> &'static str {
        match self {
            StaffKind::Doctor => "Doctor",
            StaffKind::Receptionist => "Receptionist",
        }
    }
}

async fn add_staff(
    state: &AppState,
    ctx: &SessionContext,
    kind: StaffKind,
    form: &StaffForm,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    if is_blank(&form.name) || is_blank(&form.email) || form.password.is_empty() {
        return Err(ctx.reject(ApiError::validation(REQUIRED_FIELDS)));
    }

    let api = ctx.api(state);
    let id = clinic_id(&api, ctx).await?;

    let payload = StaffPayload {
        name: form.name.trim(),
        email: form.email.trim(),
        password: &form.password,
        phone: form.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()),
        speciality_ids: match kind {
            StaffKind::Doctor => form.speciality_ids.as_slice(),
            StaffKind::Receptionist => &[],
        },
    };
    let fallback = format!("Failed to add {}", kind.endpoint());
    let _: Value = api
        .post(&format!("/clinics/{id}/{}", kind.endpoint()), &payload)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, &fallback)))?;

    ctx.success(format!("{} added successfully!", kind.label()));
    tracing::info!(clinic = %id, kind = kind.endpoint(), "staff added");

    let staff = or_empty(ctx, kind.list(), api.get(&format!("/clinics/{id}/{}", kind.list())).await);
    Ok(Json(ApiOk::new(staff)))
}

pub async fn add_doctor(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(form): Json<StaffForm>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    add_staff(&state, &ctx, StaffKind::Doctor, &form).await
}

pub async fn add_receptionist(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(form): Json<StaffForm>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    add_staff(&state, &ctx, StaffKind::Receptionist, &form).await
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::{MockBackend, spawn_app};
    use axum::http::Method;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_add_clinic_validates_then_refetches() {
        let mock = MockBackend::start().await;
        mock.respond(Method::POST, "/clinics", 201, json!({"id": "c2"}));
        mock.respond(Method::GET, "/clinics", 200, json!([{"id": "c1"}, {"id": "c2"}]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::SystemAdmin).await;

        let resp = app
            .post("/api/v1/clinics", &s)
            .json(&json!({"name": "East", "location": "", "contact": "555"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(mock.requests().is_empty());

        let v: Value = app
            .post("/api/v1/clinics", &s)
            .json(&json!({"name": "East", "location": "Main St", "contact": "555"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["data"].as_array().unwrap().len(), 2);
        assert_eq!(
            app.toast_messages(&s),
            vec!["Please fill in all required fields".to_string(), "Clinic added successfully!".to_string()]
        );
    }

    #[tokio::test]
    async fn test_admin_dashboard_counts() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics/my-clinic", 200, json!({"id": 4, "name": "North"}));
        mock.respond(Method::GET, "/clinics/4/doctors", 200, json!([{}, {}]));
        mock.respond(Method::GET, "/clinics/4/patients", 200, json!([{}, {}, {}]));
        mock.respond(Method::GET, "/clinics/4/receptionists", 200, json!([{}]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::ClinicAdmin).await;

        let v: Value = app.get("/admin-dashboard", &s).send().await.unwrap().json().await.unwrap();
        let counts = &v["data"]["counts"];
        assert_eq!(counts["doctors"], 2);
        assert_eq!(counts["patients"], 3);
        assert_eq!(counts["receptionists"], 1);
        assert_eq!(counts["appointments"], 0);
        assert_eq!(v["data"]["clinic"]["name"], "North");
        assert_eq!(app.toast_messages(&s), vec!["Failed to load appointments".to_string()]);
    }

    #[tokio::test]
    async fn test_add_doctor() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics/my-clinic", 200, json!({"id": "c1"}));
        mock.respond(Method::POST, "/clinics/c1/doctor", 201, json!({"id": "d9"}));
        mock.respond(Method::GET, "/clinics/c1/doctors", 200, json!([{"id": "d9"}]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::ClinicAdmin).await;

        let v: Value = app
            .post("/api/v1/clinic-admin/doctors", &s)
            .json(&json!({"name": "Dr. Who", "email": "who@x.io", "password": "pw", "speciality_ids": ["s1"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["data"][0]["id"], "d9");
        let sent = &mock.requests_to(Method::POST, "/clinics/c1/doctor")[0];
        assert_eq!(
            sent.body,
            json!({"name": "Dr. Who", "email": "who@x.io", "password": "pw", "specialityIds": ["s1"]})
        );
        assert_eq!(app.toast_messages(&s), vec!["Doctor added successfully!".to_string()]);
    }

    #[tokio::test]
    async fn test_add_receptionist_sends_no_specialities() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics/my-clinic", 200, json!({"id": "c1"}));
        mock.respond(Method::POST, "/clinics/c1/receptionist", 201, json!({"id": "r4"}));
        mock.respond(Method::GET, "/clinics/c1/receptionists", 200, json!([{"id": "r4"}]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::ClinicAdmin).await;

        let resp = app
            .post("/api/v1/clinic-admin/receptionists", &s)
            .json(&json!({"name": "Sam", "email": "sam@x.io", "password": "pw", "speciality_ids": ["s1"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let sent = &mock.requests_to(Method::POST, "/clinics/c1/receptionist")[0];
        assert_eq!(sent.body, json!({"name": "Sam", "email": "sam@x.io", "password": "pw"}));
        assert_eq!(app.toast_messages(&s), vec!["Receptionist added successfully!".to_string()]);
    }

    #[tokio::test]
    async fn test_add_receptionist_without_clinic() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics/my-clinic", 500, json!({}));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::ClinicAdmin).await;

        let resp = app
            .post("/api/v1/clinic-admin/receptionists", &s)
            .json(&json!({"name": "Sam", "email": "sam@x.io", "password": "pw"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"]["message"], "Clinic information not loaded");
        assert!(mock.requests().iter().all(|r| r.method == Method::GET));
    }
}
