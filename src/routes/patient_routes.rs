use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    appointments::{self, AppointmentWorkflow, Desk, EditAppointmentForm, NewAppointmentForm},
    error::ApiError,
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, AppointmentView, PatientReport, UserProfile},
    routes::{CancelRequest, or_empty, workflow_failed},
};

pub fn pages() -> Router<AppState> {
    Router::new().route("/patient-details", get(patient_details))
}

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/clinics/{clinic_id}/doctors", get(clinic_doctors))
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/{id}", patch(edit_appointment))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
        .route("/reports", get(list_reports))
        .route("/bills", get(list_bills))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub show_cancelled: bool,
}

fn workflow(state: &AppState, ctx: &SessionContext) -> AppointmentWorkflow {
    AppointmentWorkflow::new(
        ctx.api(state),
        Desk::Patient {
            patient_id: ctx.user().id.clone(),
        },
    )
}

#[derive(Debug, Serialize)]
pub struct PatientDetails {
    pub user: UserProfile,
    pub clinics: Vec<Value>,
    pub appointments: Vec<AppointmentView>,
    pub notifications: Vec<Value>,
    pub reports: Vec<PatientReport>,
    pub show_cancelled: bool,
}

pub async fn patient_details(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<ListQuery>,
) -> Json<ApiOk<PatientDetails>> {
    let api = ctx.api(&state);
    let user_id = ctx.user().id.clone();
    let wf = workflow(&state, &ctx);

    let notifications_path = format!("/notifications/{user_id}");
    let reports_path = format!("/appointments/patient/{user_id}/reports");
    let (clinics, list, notifications, reports) = tokio::join!(
        api.get::<Vec<Value>>("/clinics"),
        wf.load(),
        api.get::<Vec<Value>>(&notifications_path),
        api.get::<Vec<PatientReport>>(&reports_path),
    );

    let list = or_empty(&ctx, "appointments", list);
    Json(ApiOk::new(PatientDetails {
        user: ctx.user().clone(),
        clinics: or_empty(&ctx, "clinics", clinics),
        appointments: appointments::to_views(appointments::visible(list, q.show_cancelled)),
        notifications: or_empty(&ctx, "notifications", notifications),
        reports: or_empty(&ctx, "reports", reports),
        show_cancelled: q.show_cancelled,
    }))
}

pub async fn clinic_doctors(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(clinic_id): Path<String>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let doctors = ctx
        .api(&state)
        .get(&format!("/doctors/clinic/{clinic_id}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load doctors")))?;
    Ok(Json(ApiOk::new(doctors)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .load()
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load appointments")))?;
    Ok(Json(ApiOk::new(appointments::to_views(appointments::visible(
        list,
        q.show_cancelled,
    )))))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Query(q): Query<ListQuery>,
    Json(form): Json<NewAppointmentForm>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .create(&form)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment request sent!");
    Ok(Json(ApiOk::new(appointments::to_views(appointments::visible(
        list,
        q.show_cancelled,
    )))))
}

pub async fn edit_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Query(q): Query<ListQuery>,
    Json(form): Json<EditAppointmentForm>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .edit(&id, &form)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment updated successfully");
    Ok(Json(ApiOk::new(appointments::to_views(appointments::visible(
        list,
        q.show_cancelled,
    )))))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Query(q): Query<ListQuery>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    let list = workflow(&state, &ctx)
        .cancel(&id, req.confirmed)
        .await
        .map_err(|e| workflow_failed(&ctx, e))?;
    ctx.success("Appointment cancelled successfully");
    Ok(Json(ApiOk::new(appointments::to_views(appointments::visible(
        list,
        q.show_cancelled,
    )))))
}

pub async fn list_reports(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<PatientReport>>>, ApiError> {
    let reports = ctx
        .api(&state)
        .get(&format!("/appointments/patient/{}/reports", ctx.user().id))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load reports")))?;
    Ok(Json(ApiOk::new(reports)))
}

pub async fn list_bills(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    let bills = ctx
        .api(&state)
        .get(&format!("/billing/patient/{}", ctx.user().id))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load bills")))?;
    Ok(Json(ApiOk::new(bills)))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::test_support::{MockBackend, spawn_app};
    use axum::http::Method;
    use serde_json::{Value, json};

    fn appt(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "patientId": "patient-1",
            "clinicName": "North Clinic",
            "startTime": "2025-05-01T09:00:00.000Z",
            "endTime": "2025-05-01T09:30:00.000Z",
            "status": status
        })
    }

    #[tokio::test]
    async fn test_clinic_doctors_uses_patient_lookup() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/doctors/clinic/c1", 200, json!([{"id": "d1", "name": "Dr. Grey"}]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        let resp = app.get("/api/v1/patient/clinics/c1/doctors", &s).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["data"][0]["id"], "d1");

        let paths: Vec<String> = mock.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/doctors/clinic/c1".to_string()]);
    }

    #[tokio::test]
    async fn test_page_loads_lists_and_tolerates_failures() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/clinics", 200, json!([{"id": "c1", "name": "North Clinic"}]));
        mock.respond(
            Method::GET,
            "/appointments/patient/patient-1",
            200,
            json!([appt("a1", "PENDING"), appt("a2", "CANCELLED"), appt("a3", "COMPLETED")]),
        );
        mock.respond(Method::GET, "/notifications/patient-1", 500, json!({}));
        mock.respond(Method::GET, "/appointments/patient/patient-1/reports", 200, json!([]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        let resp = app.get("/patient-details", &s).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let v: Value = resp.json().await.unwrap();
        let data = &v["data"];
        assert_eq!(data["clinics"].as_array().unwrap().len(), 1);
        assert!(data["notifications"].as_array().unwrap().is_empty());

        let rows = data["appointments"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["actions"]["can_edit"], true);
        assert_eq!(rows[1]["actions"]["can_cancel"], false);

        assert_eq!(app.toast_messages(&s), vec!["Failed to load notifications".to_string()]);
        let seen = mock.requests_to(Method::GET, "/clinics");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer upstream-patient"));

        let v: Value = app
            .get("/patient-details?show_cancelled=true", &s)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["data"]["appointments"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_with_blank_field_toasts_and_sends_nothing() {
        let mock = MockBackend::start().await;
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        let resp = app
            .post("/api/v1/patient/appointments", &s)
            .json(&json!({"clinic_id": "c1", "doctor_id": "", "start_time": "2025-05-01T09:00", "end_time": "2025-05-01T09:30"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(app.toast_messages(&s), vec!["Please fill all fields".to_string()]);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_success() {
        let mock = MockBackend::start().await;
        mock.respond(Method::POST, "/appointments", 201, json!({"id": "a1"}));
        mock.respond(Method::GET, "/appointments/patient/patient-1", 200, json!([appt("a1", "PENDING")]));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        let v: Value = app
            .post("/api/v1/patient/appointments", &s)
            .json(&json!({"clinic_id": "c1", "doctor_id": "d1", "start_time": "2025-05-01T09:00", "end_time": "2025-05-01T09:30", "notes": "first visit"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(v["data"][0]["id"], "a1");
        assert_eq!(app.toast_messages(&s), vec!["Appointment request sent!".to_string()]);

        let sent = &mock.requests_to(Method::POST, "/appointments")[0];
        assert_eq!(sent.body["notes"], "first visit");
        assert_eq!(sent.authorization.as_deref(), Some("Bearer upstream-patient"));
    }

    #[tokio::test]
    async fn test_cancel_flow() {
        let mock = MockBackend::start().await;
        mock.respond(Method::GET, "/appointments/patient/patient-1", 200, json!([appt("a1", "SCHEDULED")]));
        mock.respond(Method::GET, "/appointments/patient/patient-1", 200, json!([appt("a1", "CANCELLED")]));
        mock.respond(Method::PATCH, "/appointments/a1/cancel", 200, json!({}));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        // no confirmation: prompt, no toast, nothing sent
        let resp = app
            .post("/api/v1/patient/appointments/a1/cancel", &s)
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"]["code"], "CONFIRMATION_REQUIRED");
        assert!(app.toasts(&s).is_empty());
        assert!(mock.requests().is_empty());

        let v: Value = app
            .post("/api/v1/patient/appointments/a1/cancel", &s)
            .json(&json!({"confirmed": true}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(v["data"].as_array().unwrap().is_empty());
        assert_eq!(app.toast_messages(&s), vec!["Appointment cancelled successfully".to_string()]);
        assert_eq!(mock.requests_to(Method::PATCH, "/appointments/a1/cancel").len(), 1);
    }

    #[tokio::test]
    async fn test_edit_locked_and_failure_toasts() {
        let mock = MockBackend::start().await;
        mock.respond(
            Method::GET,
            "/appointments/patient/patient-1",
            200,
            json!([appt("a1", "COMPLETED"), appt("a2", "PENDING")]),
        );
        mock.respond(Method::PATCH, "/appointments/a2", 500, json!({}));
        let app = spawn_app(&mock).await;
        let s = app.login_as(Role::Patient).await;

        let resp = app
            .http
            .patch(app.url("/api/v1/patient/appointments/a1"))
            .bearer_auth(&s.token)
            .json(&json!({"notes": "later"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);

        let resp = app
            .http
            .patch(app.url("/api/v1/patient/appointments/a2"))
            .bearer_auth(&s.token)
            .json(&json!({"start_time": "", "notes": "later"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        assert_eq!(
            app.toast_messages(&s),
            vec![
                "Only pending or scheduled appointments can be changed".to_string(),
                "Failed to update appointment".to_string()
            ]
        );
        let sent = &mock.requests_to(Method::PATCH, "/appointments/a2")[0];
        assert_eq!(sent.body, json!({"notes": "later"}));
    }
}
