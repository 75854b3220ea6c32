//! Report dialog: create or edit the report attached to one appointment.
//!
//! Validation failures and upstream failures are both inline. The caller
//! keeps the dialog open on any `Err` and only toasts on success.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::gateway::{ApiClient, GatewayError};
use crate::models::{Report, is_blank};

pub const TITLE_AND_CONTENT_REQUIRED: &str = "Title and content are required";
pub const SAVE_FAILED: &str = "Failed to save report. Please try again.";
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportForm {
    pub title: String,
    pub content: String,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub recommendations: Option<String>,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Create omits blank optional fields. Edit sends them as `""` so a cleared
/// field overwrites the stored value.
fn optional(field: &Option<String>, mode: DialogMode) -> Option<String> {
    let value = field.as_deref().map(str::trim).unwrap_or_default();
    match mode {
        DialogMode::Create if value.is_empty() => None,
        _ => Some(value.to_string()),
    }
}

impl ReportForm {
    pub fn validate(&self, mode: DialogMode) -> Result<ReportPayload, String> {
        if is_blank(&self.title) || is_blank(&self.content) {
            return Err(TITLE_AND_CONTENT_REQUIRED.to_string());
        }
        let title = self.title.trim();
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(format!("Title must be at most {MAX_TITLE_CHARS} characters"));
        }

        let file_url = optional(&self.file_url, mode);
        if let Some(url) = file_url.as_deref().filter(|u| !u.is_empty()) {
            let ok = Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !ok {
                return Err("File URL must be an http(s) link".to_string());
            }
        }

        Ok(ReportPayload {
            title: title.to_string(),
            content: self.content.trim().to_string(),
            diagnosis: optional(&self.diagnosis, mode),
            prescription: optional(&self.prescription, mode),
            recommendations: optional(&self.recommendations, mode),
            file_url,
        })
    }
}

#[derive(Debug)]
pub enum ReportError {
    Invalid(String),
    Upstream(GatewayError),
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Invalid(msg) => ApiError::validation(msg),
            ReportError::Upstream(err) => ApiError::upstream(err, SAVE_FAILED),
        }
    }
}

pub struct ReportDialog {
    appointment_id: String,
    mode: DialogMode,
}

impl ReportDialog {
    pub fn new(appointment_id: impl Into<String>, mode: DialogMode) -> Self {
        Self {
            appointment_id: appointment_id.into(),
            mode,
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self.mode {
            DialogMode::Create => "Report created successfully",
            DialogMode::Edit => "Report updated successfully",
        }
    }

    pub async fn save(&self, api: &ApiClient, form: &ReportForm) -> Result<Report, ReportError> {
        let payload = form.validate(self.mode).map_err(ReportError::Invalid)?;
        let path = report_path(&self.appointment_id);

        let saved: Value = match self.mode {
            DialogMode::Create => api.post(&path, &payload).await,
            DialogMode::Edit => api.put(&path, &payload).await,
        }
        .map_err(ReportError::Upstream)?;

        tracing::info!(appointment = %self.appointment_id, mode = ?self.mode, "report saved");
        serde_json::from_value(saved)
            .map_err(|e| ReportError::Upstream(GatewayError::Decode(e.to_string())))
    }
}

pub fn report_path(appointment_id: &str) -> String {
    format!("/appointments/{appointment_id}/report")
}
