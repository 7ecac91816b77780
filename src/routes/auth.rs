use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::service::{ChatService, ChatSession};

pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Router state: the shared chat service, the single configured account and
/// the sessions opened by successful logins, keyed by bearer token.
#[derive(Clone)]
pub struct AppState {
    service: ChatService,
    credentials: Arc<(String, String)>,
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl AppState {
    pub fn new(service: ChatService, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            service,
            credentials: Arc::new((username.into(), password.into())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    fn check_credentials(&self, username: &str, password: &str) -> bool {
        let (expected_user, expected_password) = &*self.credentials;
        // Both comparisons always run.
        let user_ok = constant_time_eq(username.as_bytes(), expected_user.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), expected_password.as_bytes());
        user_ok & password_ok
    }

    /// Opens an isolated session and returns its token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AppError> {
        if !self.check_credentials(username, password) {
            warn!("Rejected login for user '{username}'");
            return Err(AppError::InvalidCredentials);
        }
        let token = Uuid::new_v4().simple().to_string();
        let session = Arc::new(Mutex::new(self.service.open_session()));
        self.sessions.write().await.insert(token.clone(), session);
        info!("User '{username}' logged in");
        Ok(token)
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn session(&self, token: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(token).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Session resolved from the `Authorization: Bearer <token>` header.
pub struct CurrentSession {
    pub token: String,
    pub session: SharedSession,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;
        let session = state.session(token).await.ok_or(AppError::Unauthorized)?;
        Ok(Self { token: token.to_string(), session })
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// POST `/api/login`
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let token = state.login(&req.username, &req.password).await?;
    Ok(Json(LoginResponse { token }))
}

/// POST `/api/logout`
pub async fn logout_handler(State(state): State<AppState>, current: CurrentSession) -> StatusCode {
    state.logout(&current.token).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::tests::ScriptedEngine;
    use crate::agent::{ModelInvoker, PromptAssembler, SamplingParams};
    use crate::retrieval::RetrievalAdapter;

    fn state() -> AppState {
        let invoker = ModelInvoker::new(Arc::new(ScriptedEngine::default()), SamplingParams::default());
        let service =
            ChatService::new(invoker, PromptAssembler::new("sys"), RetrievalAdapter::unavailable(), 4);
        AppState::new(service, "admin", "admin123")
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq(b"admin", b"admin"));
        assert!(!constant_time_eq(b"admin", b"admim"));
        assert!(!constant_time_eq(b"admin", b"admin1"));
    }

    #[tokio::test]
    async fn each_login_gets_an_isolated_session() {
        let state = state();
        let a = state.login("admin", "admin123").await.unwrap();
        let b = state.login("admin", "admin123").await.unwrap();
        assert_ne!(a, b);

        state.session(&a).await.unwrap().lock().await.create_chat();
        assert_eq!(state.session(&a).await.unwrap().lock().await.history().len(), 2);
        assert_eq!(state.session(&b).await.unwrap().lock().await.history().len(), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let state = state();
        assert!(matches!(
            state.login("admin", "admin").await,
            Err(AppError::InvalidCredentials)
        ));
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn logout_forgets_token() {
        let state = state();
        let token = state.login("admin", "admin123").await.unwrap();
        assert!(state.logout(&token).await);
        assert!(state.session(&token).await.is_none());
        assert!(!state.logout(&token).await);
    }
}
