use axum::{
    Json, Router,
    response::Redirect,
    routing::get,
};
use serde::Serialize;

use crate::middleware::guard::LOGIN_PATH;
use crate::models::{ApiOk, AppState, Role};

#[derive(Serialize)]
pub struct RoleTab {
    pub role: Role,
    pub label: &'static str,
}

#[derive(Serialize)]
pub struct LoginView {
    pub roles: Vec<RoleTab>,
    pub default_role: Role,
    pub signup_path: &'static str,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/login", get(login_view))
        .route("/health", get(health))
}

async fn root() -> Redirect {
    Redirect::to(LOGIN_PATH)
}

pub async fn login_view() -> Json<ApiOk<LoginView>> {
    Json(ApiOk::new(LoginView {
        roles: Role::ALL
            .into_iter()
            .map(|role| RoleTab {
                role,
                label: role.label(),
            })
            .collect(),
        default_role: Role::Doctor,
        signup_path: "/api/v1/auth/register",
    }))
}

async fn health() -> Json<ApiOk<Health>> {
    Json(ApiOk::new(Health { status: "ok" }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{MockBackend, spawn_app};
    use serde_json::Value;

    #[tokio::test]
    async fn test_public_routes() {
        let mock = MockBackend::start().await;
        let app = spawn_app(&mock).await;

        let v: Value = app.http.get(app.url("/health")).send().await.unwrap().json().await.unwrap();
        assert_eq!(v["data"]["status"], "ok");

        let v: Value = app.http.get(app.url("/login")).send().await.unwrap().json().await.unwrap();
        assert_eq!(v["data"]["default_role"], "DOCTOR");
        assert_eq!(v["data"]["roles"].as_array().unwrap().len(), 5);

        let resp = app.http.get(app.url("/")).send().await.unwrap();
        assert_eq!(resp.status(), 303);
        assert_eq!(resp.headers()["location"], "/login");
    }
}
