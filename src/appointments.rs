//! Appointment booking workflow shared by the patient and front-desk pages.
//!
//! Forms are validated before anything leaves the portal. Edits and
//! cancellations are checked against a fresh copy of the appointment, and
//! every successful mutation answers with a re-fetched list rather than a
//! locally patched one.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::gateway::{ApiClient, GatewayError};
use crate::models::{Appointment, AppointmentStatus, AppointmentView, is_blank};

pub const FILL_ALL_FIELDS: &str = "Please fill all fields";
pub const INVALID_TIME: &str = "Invalid date/time";
pub const END_BEFORE_START: &str = "End time must be after start time";
pub const CANCEL_PROMPT: &str =
    "Are you sure you want to cancel this appointment? This action cannot be undone.";
pub const LOCKED: &str = "Only pending or scheduled appointments can be changed";

pub const QUEUE_PAGE_SIZE: usize = 5;
pub const PATIENT_PAGE_SIZE: usize = 10;

/* ============================================================
   Forms
   ============================================================ */

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewAppointmentForm {
    pub clinic_id: String,
    pub doctor_id: String,
    pub patient_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentPayload {
    pub clinic_id: String,
    pub doctor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewAppointmentForm {
    pub fn validate(&self, desk: &Desk) -> Result<CreateAppointmentPayload, String> {
        let patient_missing = match desk {
            Desk::Receptionist => self.patient_id.as_deref().is_none_or(is_blank),
            Desk::Patient { .. } => false,
        };
        if is_blank(&self.clinic_id)
            || is_blank(&self.doctor_id)
            || is_blank(&self.start_time)
            || is_blank(&self.end_time)
            || patient_missing
        {
            return Err(FILL_ALL_FIELDS.to_string());
        }

        let (Some(start), Some(end)) = (parse_time(&self.start_time), parse_time(&self.end_time)) else {
            return Err(INVALID_TIME.to_string());
        };
        if end <= start {
            return Err(END_BEFORE_START.to_string());
        }

        Ok(CreateAppointmentPayload {
            clinic_id: self.clinic_id.trim().to_string(),
            doctor_id: self.doctor_id.trim().to_string(),
            patient_id: match desk {
                Desk::Receptionist => self.patient_id.as_ref().map(|p| p.trim().to_string()),
                Desk::Patient { .. } => None,
            },
            start_time: format_time(start),
            end_time: format_time(end),
            notes: self.notes.clone().filter(|n| !is_blank(n)),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EditAppointmentForm {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAppointmentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EditAppointmentForm {
    /// Blank or unreadable times are left out of the PATCH.
    pub fn to_payload(&self) -> Result<EditAppointmentPayload, String> {
        let start = self.start_time.as_deref().and_then(parse_time);
        let end = self.end_time.as_deref().and_then(parse_time);
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(END_BEFORE_START.to_string());
            }
        }
        Ok(EditAppointmentPayload {
            start_time: start.map(format_time),
            end_time: end.map(format_time),
            notes: self.notes.clone(),
        })
    }
}

/// Accepts RFC 3339 or a `datetime-local` value (`YYYY-MM-DDTHH:MM[:SS]`, read as UTC).
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/* ============================================================
   Workflow
   ============================================================ */

/// Which set of backend endpoints a page books through.
#[derive(Debug, Clone)]
pub enum Desk {
    /// A patient managing their own appointments.
    Patient { patient_id: String },
    /// The front desk working the pending queue.
    Receptionist,
}

impl Desk {
    fn base(&self) -> &'static str {
        match self {
            Desk::Patient { .. } => "/appointments",
            Desk::Receptionist => "/receptionist/appointments",
        }
    }

    fn create_failed(&self) -> &'static str {
        match self {
            Desk::Patient { .. } => "Unable to create appointment",
            Desk::Receptionist => "Failed to create appointment",
        }
    }
}

#[derive(Debug)]
pub enum WorkflowError {
    Invalid(String),
    ConfirmationRequired,
    NotFound,
    Locked(AppointmentStatus),
    Upstream(GatewayError, &'static str),
}

impl WorkflowError {
    /// The cancel prompt is a dialog, not a failure toast.
    pub fn is_toast(&self) -> bool {
        !matches!(self, WorkflowError::ConfirmationRequired)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Invalid(msg) => ApiError::validation(msg),
            WorkflowError::ConfirmationRequired => {
                ApiError::BadRequest("CONFIRMATION_REQUIRED", CANCEL_PROMPT.into())
            }
            WorkflowError::NotFound => ApiError::NotFound("NOT_FOUND", "Appointment not found".into()),
            WorkflowError::Locked(_) => ApiError::Conflict("APPOINTMENT_LOCKED", LOCKED.into()),
            WorkflowError::Upstream(err, fallback) => ApiError::upstream(err, fallback),
        }
    }
}

pub struct AppointmentWorkflow {
    api: ApiClient,
    desk: Desk,
}

impl AppointmentWorkflow {
    pub fn new(api: ApiClient, desk: Desk) -> Self {
        Self { api, desk }
    }

    /// Full list for this desk, straight from the backend.
    pub async fn load(&self) -> Result<Vec<Appointment>, GatewayError> {
        match &self.desk {
            Desk::Patient { patient_id } => {
                self.api
                    .get(&format!("/appointments/patient/{patient_id}"))
                    .await
            }
            Desk::Receptionist => {
                self.api
                    .get_query(
                        "/receptionist/appointments/pending",
                        &[("page", "1"), ("search", "")],
                    )
                    .await
            }
        }
    }

    async fn reload(&self) -> Result<Vec<Appointment>, WorkflowError> {
        self.load()
            .await
            .map_err(|e| WorkflowError::Upstream(e, "Failed to load appointments"))
    }

    async fn current(&self, appointment_id: &str) -> Result<Appointment, WorkflowError> {
        self.reload()
            .await?
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or(WorkflowError::NotFound)
    }

    pub async fn create(&self, form: &NewAppointmentForm) -> Result<Vec<Appointment>, WorkflowError> {
        let payload = form.validate(&self.desk).map_err(WorkflowError::Invalid)?;

        let _: Value = self
            .api
            .post(self.desk.base(), &payload)
            .await
            .map_err(|e| WorkflowError::Upstream(e, self.desk.create_failed()))?;

        tracing::info!(clinic = %payload.clinic_id, doctor = %payload.doctor_id, "appointment requested");
        self.reload().await
    }

    pub async fn edit(
        &self,
        appointment_id: &str,
        form: &EditAppointmentForm,
    ) -> Result<Vec<Appointment>, WorkflowError> {
        let payload = form.to_payload().map_err(WorkflowError::Invalid)?;

        let current = self.current(appointment_id).await?;
        if !current.status.is_actionable() {
            return Err(WorkflowError::Locked(current.status));
        }

        let _: Value = self
            .api
            .patch(&format!("{}/{appointment_id}", self.desk.base()), &payload)
            .await
            .map_err(|e| WorkflowError::Upstream(e, "Failed to update appointment"))?;

        self.reload().await
    }

    pub async fn cancel(
        &self,
        appointment_id: &str,
        confirmed: bool,
    ) -> Result<Vec<Appointment>, WorkflowError> {
        if !confirmed {
            return Err(WorkflowError::ConfirmationRequired);
        }

        let current = self.current(appointment_id).await?;
        if !current.status.can_transition_to(AppointmentStatus::Cancelled) {
            return Err(WorkflowError::Locked(current.status));
        }

        let _: Value = self
            .api
            .patch_empty(&format!("{}/{appointment_id}/cancel", self.desk.base()))
            .await
            .map_err(|e| WorkflowError::Upstream(e, "Failed to cancel appointment"))?;

        tracing::info!(appointment = %appointment_id, "appointment cancelled");
        self.reload().await
    }

    /// Front desk only: PENDING → SCHEDULED.
    pub async fn accept(&self, appointment_id: &str) -> Result<Vec<Appointment>, WorkflowError> {
        if !matches!(self.desk, Desk::Receptionist) {
            return Err(WorkflowError::Invalid(
                "Only the front desk can accept appointments".into(),
            ));
        }

        let current = self.current(appointment_id).await?;
        if !current.status.can_transition_to(AppointmentStatus::Scheduled) {
            return Err(WorkflowError::Locked(current.status));
        }

        let _: Value = self
            .api
            .patch_empty(&format!("/receptionist/appointments/{appointment_id}/accept"))
            .await
            .map_err(|e| WorkflowError::Upstream(e, "Failed to accept appointment"))?;

        self.reload().await
    }
}

/* ============================================================
   List views
   ============================================================ */

/// The default view hides cancelled appointments.
pub fn visible(list: Vec<Appointment>, show_cancelled: bool) -> Vec<Appointment> {
    if show_cancelled {
        list
    } else {
        list.into_iter()
            .filter(|a| a.status != AppointmentStatus::Cancelled)
            .collect()
    }
}

pub fn to_views(list: Vec<Appointment>) -> Vec<AppointmentView> {
    list.into_iter().map(AppointmentView::from).collect()
}

/// Case-insensitive match on patient or clinic name.
pub fn search_patient_or_clinic(list: Vec<Appointment>, query: &str) -> Vec<Appointment> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return list;
    }
    list.into_iter()
        .filter(|a| {
            a.display_patient().to_lowercase().contains(&q)
                || a.clinic_name
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&q))
        })
        .collect()
}

/// Front-desk filters: doctor id, and a `YYYY-MM-DD` prefix of the start time.
pub fn filter_queue(list: Vec<Appointment>, doctor_id: Option<&str>, date: Option<&str>) -> Vec<Appointment> {
    let doctor_id = doctor_id.filter(|d| !is_blank(d));
    let date = date.filter(|d| !is_blank(d));
    list.into_iter()
        .filter(|a| doctor_id.is_none_or(|d| a.doctor_id.as_deref() == Some(d)))
        .filter(|a| date.is_none_or(|d| a.start_time.starts_with(d)))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// 1-based pages. A page past the end is empty.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Page<T> {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    Page {
        items,
        page,
        per_page,
        total,
        total_pages,
    }
}
