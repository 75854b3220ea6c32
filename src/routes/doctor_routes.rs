use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    appointments::{self, parse_time},
    error::ApiError,
    gateway::{ApiClient, GatewayError},
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, Appointment, AppointmentStatus, AppointmentView, Report, UserProfile},
    reports::{DialogMode, ReportDialog, ReportForm, report_path},
    routes::{field_contains, or_empty},
};

const UPCOMING: usize = 5;

pub fn pages() -> Router<AppState> {
    Router::new()
        .route("/doctor-dashboard", get(dashboard))
        .route("/doctor-appointments", get(appointments_page))
        .route("/doctor-patients", get(patients_page))
        .route("/doctor-reports", get(reports_page))
}

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments))
        .route(
            "/appointments/{id}/report",
            get(get_report)
                .post(create_report)
                .put(update_report)
                .delete(delete_report),
        )
        .route("/reports", get(list_reports))
        .route("/patients", get(list_patients))
}

async fn load_appointments(api: &ApiClient, doctor_id: &str) -> Result<Vec<Appointment>, GatewayError> {
    api.get(&format!("/appointments/doctor/{doctor_id}")).await
}

async fn load_reports(api: &ApiClient, doctor_id: &str) -> Result<Vec<Value>, GatewayError> {
    api.get(&format!("/appointments/doctor/{doctor_id}/reports")).await
}

fn search_patients(patients: Vec<Value>, query: &str) -> Vec<Value> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return patients;
    }
    patients
        .into_iter()
        .filter(|p| field_contains(p, "name", &q) || field_contains(p, "email", &q))
        .collect()
}

/* -------------------------
   Pages
--------------------------*/

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn tally(list: &[Appointment]) -> Self {
        let mut c = StatusCounts {
            total: list.len(),
            ..Default::default()
        };
        for a in list {
            match a.status {
                AppointmentStatus::Pending => c.pending += 1,
                AppointmentStatus::Scheduled => c.scheduled += 1,
                AppointmentStatus::Completed => c.completed += 1,
                AppointmentStatus::Cancelled => c.cancelled += 1,
            }
        }
        c
    }
}

/// Open appointments, soonest first.
fn upcoming(list: Vec<Appointment>, n: usize) -> Vec<Appointment> {
    let mut open: Vec<Appointment> = list.into_iter().filter(|a| a.status.is_actionable()).collect();
    open.sort_by_key(|a| parse_time(&a.start_time).unwrap_or(DateTime::<Utc>::MAX_UTC));
    open.truncate(n);
    open
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub user: UserProfile,
    pub counts: StatusCounts,
    pub report_count: usize,
    pub upcoming: Vec<AppointmentView>,
}

pub async fn dashboard(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<DoctorDashboard>> {
    let api = ctx.api(&state);
    let doctor_id = ctx.user().id.clone();
    let (list, reports) = tokio::join!(load_appointments(&api, &doctor_id), load_reports(&api, &doctor_id));

    let list = or_empty(&ctx, "appointments", list);
    let reports = or_empty(&ctx, "reports", reports);
    Json(ApiOk::new(DoctorDashboard {
        user: ctx.user().clone(),
        counts: StatusCounts::tally(&list),
        report_count: reports.len(),
        upcoming: appointments::to_views(upcoming(list, UPCOMING)),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub search: String,
    pub show_cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct DoctorAppointments {
    pub search: String,
    pub appointments: Vec<AppointmentView>,
}

pub async fn appointments_page(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<SearchQuery>,
) -> Json<ApiOk<DoctorAppointments>> {
    let list = or_empty(
        &ctx,
        "appointments",
        load_appointments(&ctx.api(&state), &ctx.user().id).await,
    );
    let list = appointments::search_patient_or_clinic(appointments::visible(list, q.show_cancelled), &q.search);
    Json(ApiOk::new(DoctorAppointments {
        appointments: appointments::to_views(list),
        search: q.search,
    }))
}

#[derive(Debug, Serialize)]
pub struct DoctorPatients {
    pub search: String,
    pub patients: Vec<Value>,
}

pub async fn patients_page(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<SearchQuery>,
) -> Json<ApiOk<DoctorPatients>> {
    let patients = or_empty(&ctx, "patients", ctx.api(&state).get("/users/patients").await);
    Json(ApiOk::new(DoctorPatients {
        patients: search_patients(patients, &q.search),
        search: q.search,
    }))
}

#[derive(Debug, Serialize)]
pub struct DoctorReports {
    pub reports: Vec<Value>,
}

pub async fn reports_page(State(state): State<AppState>, ctx: SessionContext) -> Json<ApiOk<DoctorReports>> {
    let reports = or_empty(&ctx, "reports", load_reports(&ctx.api(&state), &ctx.user().id).await);
    Json(ApiOk::new(DoctorReports { reports }))
}

/* -------------------------
   API
--------------------------*/

pub async fn list_appointments(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    let list = load_appointments(&ctx.api(&state), &ctx.user().id)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load appointments")))?;
    let list = appointments::search_patient_or_clinic(appointments::visible(list, q.show_cancelled), &q.search);
    Ok(Json(ApiOk::new(appointments::to_views(list))))
}

pub async fn list_patients(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let patients: Vec<Value> = ctx
        .api(&state)
        .get("/users/patients")
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load patients")))?;
    Ok(Json(ApiOk::new(search_patients(patients, &q.search))))
}

pub async fn list_reports(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let reports = load_reports(&ctx.api(&state), &ctx.user().id)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load reports")))?;
    Ok(Json(ApiOk::new(reports)))
}

pub async fn get_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(appointment_id): Path<String>,
) -> Result<Json<ApiOk<Report>>, ApiError> {
    let report = ctx
        .api(&state)
        .get(&report_path(&appointment_id))
        .await
        .map_err(|e| ApiError::upstream(e, "Failed to load report"))?;
    Ok(Json(ApiOk::new(report)))
}

async fn save_report(
    state: &AppState,
    ctx: &SessionContext,
    appointment_id: String,
    mode: DialogMode,
    form: &ReportForm,
) -> Result<Json<ApiOk<Report>>, ApiError> {
    let dialog = ReportDialog::new(appointment_id, mode);
    // inline errors only; the dialog stays open
    let report = dialog.save(&ctx.api(state), form).await?;
    ctx.success(dialog.success_message());
    Ok(Json(ApiOk::new(report)))
}

pub async fn create_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(appointment_id): Path<String>,
    Json(form): Json<ReportForm>,
) -> Result<Json<ApiOk<Report>>, ApiError> {
    save_report(&state, &ctx, appointment_id, DialogMode::Create, &form).await
}

pub async fn update_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(appointment_id): Path<String>,
    Json(form): Json<ReportForm>,
) -> Result<Json<ApiOk<Report>>, ApiError> {
    save_report(&state, &ctx, appointment_id, DialogMode::Edit, &form).await
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub appointment_id: String,
}

pub async fn delete_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(appointment_id): Path<String>,
) -> Result<Json<ApiOk<Deleted>>, ApiError> {
    let _: Value = ctx
        .api(&state)
        .delete(&report_path(&appointment_id))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to delete report")))?;
    ctx.success("Report deleted");
    tracing::info!(appointment = %appointment_id, "report deleted");
    Ok(Json(ApiOk::new(Deleted { appointment_id })))
}
