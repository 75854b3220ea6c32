use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ApiError,
    gateway::{GatewayError, extract_message},
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState, is_blank},
};

pub const ACCEPTED_EXTENSIONS: [&str; 3] = [".pdf", ".txt", ".md"];
pub const WRONG_TYPE: &str = "Please upload a PDF, TXT, or MD file";
pub const UPLOAD_FAILED: &str = "Failed to upload file. Make sure the document service is running.";
pub const CHAT_FAILED: &str = "Failed to get response. Make sure the document service is running.";

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn pages() -> Router<AppState> {
    Router::new().route("/chatbot", get(chatbot_page))
}

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
        .route("/chat", post(chat))
}

/// Extension check on the file name, case-insensitive.
pub fn is_accepted(file_name: &str) -> bool {
    let Some(dot) = file_name.rfind('.') else {
        return false;
    };
    let ext = file_name[dot..].to_lowercase();
    ACCEPTED_EXTENSIONS.contains(&ext.as_str())
}

/// The document service answers 200 with `{"error": ...}` when it fails.
fn reported_failure(body: &Value) -> Option<GatewayError> {
    body.get("error")?;
    let message = extract_message(body).unwrap_or_else(|| "Document service error".into());
    Some(GatewayError::Rejected(message))
}

#[derive(Debug, Serialize)]
pub struct ChatbotPage {
    pub accepted: [&'static str; 3],
}

pub async fn chatbot_page(_ctx: SessionContext) -> Json<ApiOk<ChatbotPage>> {
    Json(ApiOk::new(ChatbotPage {
        accepted: ACCEPTED_EXTENSIONS,
    }))
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub filename: String,
    pub status: Option<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    ctx: SessionContext,
    mut multipart: Multipart,
) -> Result<Json<ApiOk<UploadResult>>, ApiError> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Malformed upload: {e}")))?;
        file = Some((name, bytes));
        break;
    }

    let (name, bytes) = file.ok_or_else(|| ApiError::validation(WRONG_TYPE))?;
    if !is_accepted(&name) {
        return Err(ApiError::validation(WRONG_TYPE));
    }

    let form = Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(name.clone()));
    let result: Result<Value, GatewayError> = state.chatbot.post_multipart("/Upload_File", form).await;
    let body = match result {
        Ok(body) => match reported_failure(&body) {
            Some(err) => Err(err),
            None => Ok(body),
        },
        Err(e) => Err(e),
    }
    .map_err(|e| ApiError::upstream(e, UPLOAD_FAILED))?;

    tracing::info!(user_id = %ctx.user().id, file = %name, size = bytes.len(), "document uploaded");
    Ok(Json(ApiOk::new(UploadResult {
        filename: body
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(name),
        status: body.get("status").and_then(Value::as_str).map(str::to_string),
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
struct UpstreamChat<'a> {
    question: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
}

pub async fn chat(
    State(state): State<AppState>,
    _ctx: SessionContext,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ApiOk<ChatAnswer>>, ApiError> {
    if is_blank(&req.question) {
        return Err(ApiError::validation("Please enter a question"));
    }

    let answer = async {
        let body: Value = state
            .chatbot
            .post("/chat", &UpstreamChat {
                question: req.question.trim(),
            })
            .await?;
        if let Some(err) = reported_failure(&body) {
            return Err(err);
        }
        body.get("Assistant")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Decode("chat reply without Assistant".into()))
    }
    .await
    .map_err(|e| ApiError::upstream(e, CHAT_FAILED))?;

    Ok(Json(ApiOk::new(ChatAnswer { answer })))
}
