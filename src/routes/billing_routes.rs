use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, Role, is_blank},
    routes::record_id,
};

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/", post(create_bill))
        .route("/{bill_id}", get(get_bill))
        .route("/{bill_id}/pay", post(pay_bill))
        .route("/patient/{patient_id}", get(patient_bills))
        .route("/clinic/{clinic_id}", get(clinic_bills))
}

fn ensure_staff(ctx: &SessionContext) -> Result<(), ApiError> {
    if ctx.role().is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("FORBIDDEN", "Only clinic staff can manage bills".into()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BillForm {
    pub appointment_id: String,
    pub patient_id: String,
    pub total_amount: f64,
    pub discount: Option<f64>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPayload {
    pub appointment_id: String,
    pub patient_id: String,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
}

impl BillForm {
    pub fn validate(&self) -> Result<BillPayload, String> {
        if is_blank(&self.appointment_id) || is_blank(&self.patient_id) {
            return Err("Please fill all fields".into());
        }
        if !self.total_amount.is_finite() || self.total_amount < 0.0 {
            return Err("Total amount must be zero or more".into());
        }
        if let Some(d) = self.discount {
            if !d.is_finite() || d < 0.0 || d > self.total_amount {
                return Err("Discount must be between 0 and the total amount".into());
            }
        }
        Ok(BillPayload {
            appointment_id: self.appointment_id.trim().to_string(),
            patient_id: self.patient_id.trim().to_string(),
            total_amount: self.total_amount,
            discount: self.discount,
        })
    }
}

fn default_method() -> String {
    "CASH".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub amount: f64,
    #[serde(default = "default_method")]
    pub method: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct PaymentPayload {
    pub amount: f64,
    pub method: String,
}

impl PaymentForm {
    pub fn validate(&self) -> Result<PaymentPayload, String> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err("Payment amount must be greater than zero".into());
        }
        if is_blank(&self.method) {
            return Err("Payment method is required".into());
        }
        Ok(PaymentPayload {
            amount: self.amount,
            method: self.method.trim().to_uppercase(),
        })
    }
}

pub async fn create_bill(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(form): Json<BillForm>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    ensure_staff(&ctx).map_err(|e| ctx.reject(e))?;
    let payload = form
        .validate()
        .map_err(|m| ctx.reject(ApiError::validation(m)))?;

    let bill: Value = ctx
        .api(&state)
        .post("/billing", &payload)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to create bill")))?;

    let id = record_id(&bill).unwrap_or_default();
    ctx.success(format!("Bill Created: {id}"));
    tracing::info!(bill = %id, appointment = %payload.appointment_id, "bill created");
    Ok(Json(ApiOk::new(bill)))
}

pub async fn get_bill(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(bill_id): Path<String>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    let bill = ctx
        .api(&state)
        .get(&format!("/billing/{bill_id}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load bill")))?;
    Ok(Json(ApiOk::new(bill)))
}

pub async fn pay_bill(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(bill_id): Path<String>,
    Json(form): Json<PaymentForm>,
) -> Result<Json<ApiOk<Value>>, ApiError> {
    let payload = form
        .validate()
        .map_err(|m| ctx.reject(ApiError::validation(m)))?;

    let result = ctx
        .api(&state)
        .post(&format!("/billing/{bill_id}/pay"), &payload)
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Payment failed")))?;
    ctx.success("Payment successful");
    tracing::info!(bill = %bill_id, amount = payload.amount, "bill paid");
    Ok(Json(ApiOk::new(result)))
}

pub async fn patient_bills(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(patient_id): Path<String>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    if ctx.role() == Role::Patient && ctx.user().id != patient_id {
        return Err(ApiError::Forbidden("FORBIDDEN", "Patients can only view their own bills".into()));
    }
    let bills = ctx
        .api(&state)
        .get(&format!("/billing/patient/{patient_id}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load bills")))?;
    Ok(Json(ApiOk::new(bills)))
}

pub async fn clinic_bills(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(clinic_id): Path<String>,
) -> Result<Json<ApiOk<Vec<Value>>>, ApiError> {
    ensure_staff(&ctx)?;
    let bills = ctx
        .api(&state)
        .get(&format!("/billing/clinic/{clinic_id}"))
        .await
        .map_err(|e| ctx.reject(ApiError::upstream(e, "Failed to load bills")))?;
    Ok(Json(ApiOk::new(bills)))
}
