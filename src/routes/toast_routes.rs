use axum::{
    Json, Router,
    extract::Path,
    routing::{delete, get},
};
use serde::Serialize;

use crate::{
    error::ApiError,
    middleware::auth_context::SessionContext,
    models::{ApiOk, AppState},
    notify::Toast,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_toasts))
        .route("/{id}", delete(dismiss_toast))
}

pub async fn list_toasts(ctx: SessionContext) -> Json<ApiOk<Vec<Toast>>> {
    Json(ApiOk::new(ctx.notifier.list()))
}

#[derive(Serialize)]
pub struct Dismissed {
    pub id: u64,
}

pub async fn dismiss_toast(
    ctx: SessionContext,
    Path(id): Path<u64>,
) -> Result<Json<ApiOk<Dismissed>>, ApiError> {
    if !ctx.notifier.dismiss(id) {
        return Err(ApiError::NotFound("NOT_FOUND", "Toast not found".into()));
    }
    Ok(Json(ApiOk::new(Dismissed { id })))
}
