use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    appointments::{
        self, AppointmentWorkflow, Desk, EditAppointmentForm, NewAppointmentForm, PATIENT_PAGE_SIZE, Page,
        QUEUE_PAGE_SIZE,
    },
    error::ApiError,
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, Appointment, AppointmentView},
    routes::{CancelRequest, field_contains, or_empty, workflow_failed},
};

pub fn pages() -> Router<AppState> {
    Router::new().route("/receptionist", get(desk_page))
}

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/clinic", get(my_clinic))
        .route("/clinics/{clinic_id}/doctors", get(clinic_doctors))
        .route("/doctors/{doctor_id}/availability", get(doctor_availability))
        .route("/appointments", get(list_queue).post(create_appointment))
        .route("/appointments/{id}", patch(edit_appointment))
        .route("/appointments/{id}/accept", post(accept_appointment))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
}

fn workflow(state: &AppState, ctx: &SessionContext) -> AppointmentWorkflow {
    AppointmentWorkflow::new(ctx.api(state), Desk::Receptionist)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueueQuery {
    pub page: usize,
    pub search: String,
    pub doctor_id: Option<String>,
    pub date: Option<String>,
}

impl QueueQuery {
    fn apply(&self, list: Vec<Appointment>) -> Page<AppointmentView> {
        let list = appointments::filter_queue(list, self.doctor_id.as_deref(), self.date.as_deref());
        let list = appointments::search_patient_or_clinic(list, &self.search);
        appointments::paginate(appointments::to_views(list), self.page, QUEUE_PAGE_SIZE)
    }
}

fn search_patients(patients: Vec<Value>, query: &str, page: usize) -> Page<Value> {
    let q = query.trim().to_lowercase();
    let matched = patients
        .into_iter()
        .filter(|p| q.is_empty() || field_contains(p, "name", &q))
        .collect();
    appointments::paginate(matched, page, PATIENT_PAGE_SIZE)
}

/* -------------------------
   Page
--------------------------*/

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeskQuery {
    pub page: usize,
    pub search: String,
    pub doctor_id: Option<String>,
    pub date: Option<String>,
    pub patient_page: usize,
    pub patient_search: String,
}

impl DeskQuery {
    fn queue(&self) -> QueueQuery {
        QueueQuery {
            page: self.page,
            search: self.search.clone(),
            doctor_id: self.doctor_id.clone(),
            date: self.date.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceptionDesk {
    pub clinics: Vec<Value>,
    pub patients: Page<Value>,
    pub appointments: Page<AppointmentView>,
}

pub async fn desk_page(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<DeskQuery>,
) -> Json<ApiOk<ReceptionDesk>> {
    let api = ctx.api(&state);
    let wf = workflow(&state, &ctx);
    let (clinics, patients, queue) = tokio::join!(
        api.get::<Vec<Value>>("/clinics"),
        api.get::<Vec<Value>>("/receptionist/patients"),
        wf.load(),
    );

    let clinics = or_empty(&ctx, "clinics", clinics);
    let patients = or_empty(&ctx, "patients", patients);
    let queue = or_empty(&ctx, "appointments", queue);
    Json(ApiOk::new(ReceptionDesk {
        clinics,
        patients: search_patients(patients, &q.patient_search, q.patient_page),
        appointments: q.queue().apply(queue),
    }))
}

/* -------------------------
   Lookups
--------------------------*/

pub async fn my_clinic(State(state): State<AppState>, ctx: SessionContext) -> Result<Json<ApiOk<Value>>, ApiError> {
    let clinic = ctx
        .api(&state)
        .get("/receptionist/my-clinic")
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load clinic")))?;
    Ok(Json(ApiOk::new(clinic)))
}

pub async fn clinic_doctors(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(clinic_id): Path<String>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let doctors = ctx
        .api(&state)
        .get(&format!("/receptionist/clinics/{clinic_id}/doctors"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load doctors")))?;
    Ok(Json(ApiOk::new(doctors)))
}

pub async fn doctor_availability(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(doctor_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    let availability = ctx
        .api(&state)
        .get_query(&format!("/receptionist/doctors/{doctor_id}/availability"), &params)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load availability")))?;
    Ok(Json(ApiOk::new(availability)))
}

/* -------------------------
   Queue
--------------------------*/

pub async fn list_queue(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<QueueQuery>,
) -> Result<Json<ApiOk<Page<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .load()
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load appointments")))?;
    Ok(Json(ApiOk::new(q.apply(list))))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<QueueQuery>,
    Json(form): Json<NewAppointmentForm>,
) -> Result<Json<ApiOk<Page<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .create(&form)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment created");
    Ok(Json(ApiOk::new(q.apply(list))))
}

pub async fn accept_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Query(q): Query<QueueQuery>,
) -> Result<Json<ApiOk<Page<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .accept(&id)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment accepted");
    tracing::info!(appointment = %id, "appointment accepted");
    Ok(Json(ApiOk::new(q.apply(list))))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Query(q): Query<QueueQuery>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ApiOk<Page<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .cancel(&id, req.confirmed)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment cancelled");
    Ok(Json(ApiOk::new(q.apply(list))))
}

pub async fn edit_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Query(q): Query<QueueQuery>,
    Json(form): Json<EditAppointmentForm>,
) -> Result<Json<ApiOk<Page<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .edit(&id, &form)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment updated");
    Ok(Json(ApiOk::new(q.apply(list))))
}
