use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::gateway::ApiClient;
use crate::notify::ToastHub;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub toasts: Arc<ToastHub>,
    /// Clinic REST backend.
    pub backend: ApiClient,
    /// AI document-chat service.
    pub chatbot: ApiClient,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Response envelope
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/* -------------------------
   Roles & users
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SystemAdmin,
    ClinicAdmin,
    Doctor,
    Patient,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Doctor,
        Role::Patient,
        Role::Receptionist,
        Role::ClinicAdmin,
        Role::SystemAdmin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SystemAdmin => "SYSTEM_ADMIN",
            Role::ClinicAdmin => "CLINIC_ADMIN",
            Role::Doctor => "DOCTOR",
            Role::Patient => "PATIENT",
            Role::Receptionist => "RECEPTIONIST",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == s.trim())
    }

    /// Tab label shown on the login view.
    pub fn label(self) -> &'static str {
        match self {
            Role::SystemAdmin => "Super Admin",
            Role::ClinicAdmin => "Clinic Admin",
            Role::Doctor => "Doctor",
            Role::Patient => "Patient",
            Role::Receptionist => "Receptionist",
        }
    }

    /// Where a freshly logged-in user of this role is sent.
    pub fn landing_path(self) -> &'static str {
        match self {
            Role::Doctor => "/doctor-dashboard",
            Role::Receptionist => "/receptionist",
            Role::Patient => "/patient-details",
            Role::SystemAdmin => "/super-admin",
            Role::ClinicAdmin => "/admin-dashboard",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Receptionist | Role::ClinicAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
}

/* -------------------------
   Appointments
--------------------------*/

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    /// The receptionist pending queue omits status; those rows are pending.
    #[default]
    Pending,
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Edit and cancel are only offered before the visit is completed or cancelled.
    pub fn is_actionable(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Scheduled)
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled) | (Pending, Cancelled) | (Scheduled, Completed) | (Scheduled, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonName {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing)]
    pub patient: Option<PersonName>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub clinic_id: Option<String>,
    #[serde(default)]
    pub clinic_name: Option<String>,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Appointment {
    pub fn display_patient(&self) -> &str {
        self.patient_name
            .as_deref()
            .or_else(|| self.patient.as_ref().and_then(|p| p.name.as_deref()))
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppointmentActions {
    pub can_edit: bool,
    pub can_cancel: bool,
}

/// One appointment row as rendered on a page, with its permitted controls.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_display: String,
    pub actions: AppointmentActions,
}

impl From<Appointment> for AppointmentView {
    fn from(appointment: Appointment) -> Self {
        let open = appointment.status.is_actionable();
        Self {
            patient_display: appointment.display_patient().to_string(),
            actions: AppointmentActions {
                can_edit: open,
                can_cancel: open,
            },
            appointment,
        }
    }
}

/* -------------------------
   Reports
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub appointment_id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub doctor_id: Option<String>,
    pub title: String,
    pub content: String,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub recommendations: Option<String>,
    pub file_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientReport {
    #[serde(deserialize_with = "de_id")]
    pub appointment_id: String,
    pub appointment_date: Option<String>,
    pub doctor: Option<serde_json::Value>,
    pub clinic: Option<serde_json::Value>,
    pub report: Report,
}

/* -------------------------
   Helpers
--------------------------*/

/// Backends disagree on string vs numeric ids; both are carried as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> String {
        match raw {
            RawId::Text(s) => s,
            RawId::Int(n) => n.to_string(),
        }
    }
}

pub fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

pub fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(d).map(|o| o.map(String::from))
}

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip_names() {
        for r in Role::ALL {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
        assert_eq!(Role::parse("NURSE"), None);
        assert_eq!(serde_json::to_value(Role::ClinicAdmin).unwrap(), json!("CLINIC_ADMIN"));
    }

    #[test]
    fn test_status_transitions() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Scheduled));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Scheduled));
    }

    #[test]
    fn test_actions_follow_status() {
        for (status, open) in [
            ("PENDING", true),
            ("SCHEDULED", true),
            ("COMPLETED", false),
            ("CANCELLED", false),
        ] {
            let a: Appointment = serde_json::from_value(json!({
                "id": "a1", "startTime": "2025-01-01T09:00:00Z", "status": status
            }))
            .unwrap();
            let v = AppointmentView::from(a);
            assert_eq!(v.actions, AppointmentActions { can_edit: open, can_cancel: open });
        }
    }

    #[test]
    fn test_pending_queue_row_decodes() {
        let a: Appointment = serde_json::from_value(json!({
            "id": 42,
            "doctorId": "d1",
            "startTime": "2025-03-04T10:00:00Z",
            "patient": { "name": "Ada" }
        }))
        .unwrap();
        assert_eq!(a.id, "42");
        assert_eq!(a.status, AppointmentStatus::Pending);
        assert_eq!(a.display_patient(), "Ada");

        let v = serde_json::to_value(AppointmentView::from(a)).unwrap();
        assert_eq!(v["patient_display"], "Ada");
        assert_eq!(v["status"], "PENDING");
        assert!(v.get("patient").is_none());
    }
}
