use std::future::Future;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::agent::Completion;
use crate::documents::{extract_document, DocumentKind, ExtractedDocument};
use crate::errors::AppError;
use crate::models::{Chat, RetrievalConfig, RetrievalSource};
use crate::routes::auth::{AppState, CurrentSession};
use crate::service::{ChatPhase, ChatSession};

// ── Views ─────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ChatSummary {
    pub index: usize,
    pub title: String,
    pub message_count: usize,
    pub active: bool,
}

#[derive(Serialize)]
pub struct ChatList {
    pub chats: Vec<ChatSummary>,
    pub active: Option<usize>,
}

#[derive(Serialize)]
pub struct ChatView {
    pub index: Option<usize>,
    pub phase: ChatPhase,
    #[serde(flatten)]
    pub chat: Option<Chat>,
}

impl ChatView {
    fn of(session: &ChatSession) -> Self {
        Self {
            index: session.history().active_index(),
            phase: session.phase(),
            chat: session.active_chat().cloned(),
        }
    }
}

/// Result of a turn: `completion` is absent when the submit was a no-op.
#[derive(Serialize)]
pub struct TurnResponse {
    pub completion: Option<Completion>,
    pub chat: ChatView,
}

#[derive(Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub kind: DocumentKind,
    pub chars: usize,
}

impl From<&ExtractedDocument> for DocumentSummary {
    fn from(doc: &ExtractedDocument) -> Self {
        Self { name: doc.name.clone(), kind: doc.kind, chars: doc.text.chars().count() }
    }
}

#[derive(Serialize)]
pub struct RetrievalView {
    #[serde(flatten)]
    pub config: RetrievalConfig,
    pub direct_text: String,
    pub document: Option<DocumentSummary>,
    pub knowledge_base_available: bool,
}

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct RetrievalUpdate {
    pub enabled: Option<bool>,
    pub source: Option<RetrievalSource>,
    pub direct_text: Option<String>,
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub name: String,
}

// ── Chats ─────────────────────────────────────────────────────────────────────

/// GET `/api/chats`
pub async fn list_chats_handler(current: CurrentSession) -> Json<ChatList> {
    let session = current.session.lock().await;
    let active = session.history().active_index();
    let chats = session
        .history()
        .chats()
        .iter()
        .enumerate()
        .map(|(index, chat)| ChatSummary {
            index,
            title: chat.title.clone(),
            message_count: chat.messages.len(),
            active: Some(index) == active,
        })
        .collect();
    Json(ChatList { chats, active })
}

/// POST `/api/chats`
pub async fn create_chat_handler(current: CurrentSession) -> (StatusCode, Json<ChatView>) {
    let mut session = current.session.lock().await;
    session.create_chat();
    (StatusCode::CREATED, Json(ChatView::of(&session)))
}

/// GET `/api/chats/active`
pub async fn active_chat_handler(current: CurrentSession) -> Json<ChatView> {
    let session = current.session.lock().await;
    Json(ChatView::of(&session))
}

/// POST `/api/chats/{index}/load`
pub async fn load_chat_handler(
    current: CurrentSession,
    Path(index): Path<usize>,
) -> Result<Json<ChatView>, AppError> {
    let mut session = current.session.lock().await;
    session.load_chat(index)?;
    Ok(Json(ChatView::of(&session)))
}

/// DELETE `/api/chats/{index}`
pub async fn delete_chat_handler(
    current: CurrentSession,
    Path(index): Path<usize>,
) -> Result<Json<ChatView>, AppError> {
    let mut session = current.session.lock().await;
    session.delete_chat(index)?;
    Ok(Json(ChatView::of(&session)))
}

/// PUT `/api/chats/{index}/title`
pub async fn rename_chat_handler(
    current: CurrentSession,
    Path(index): Path<usize>,
    Json(req): Json<RenameRequest>,
) -> Result<StatusCode, AppError> {
    current.session.lock().await.rename_chat(index, &req.title)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Turns ─────────────────────────────────────────────────────────────────────
//
// Turns run on a spawned task holding the session lock, so a dropped request
// never leaves a half-written turn behind.

async fn run_to_completion<T>(turn: impl Future<Output = T> + Send + 'static) -> Result<T, AppError>
where
    T: Send + 'static,
{
    tokio::spawn(turn)
        .await
        .map_err(|e| AppError::Unexpected(format!("Chat turn task failed: {e}")))
}

/// POST `/api/messages`
pub async fn submit_handler(
    current: CurrentSession,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let shared = current.session;
    let response = run_to_completion(async move {
        let mut session = shared.lock_owned().await;
        let completion = session.submit(&req.text).await;
        TurnResponse { completion, chat: ChatView::of(&session) }
    })
    .await?;
    Ok(Json(response))
}

/// POST `/api/messages/{index}/regenerate`
pub async fn regenerate_handler(
    current: CurrentSession,
    Path(index): Path<usize>,
) -> Result<Json<TurnResponse>, AppError> {
    let shared = current.session;
    let response = run_to_completion(async move {
        let mut session = shared.lock_owned().await;
        let completion = session.regenerate(index).await?;
        Ok::<_, AppError>(TurnResponse { completion: Some(completion), chat: ChatView::of(&session) })
    })
    .await??;
    Ok(Json(response))
}

/// PUT `/api/messages/{index}`
pub async fn edit_handler(
    current: CurrentSession,
    Path(index): Path<usize>,
    Json(req): Json<EditRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let shared = current.session;
    let response = run_to_completion(async move {
        let mut session = shared.lock_owned().await;
        let completion = session.edit(index, &req.content).await?;
        Ok::<_, AppError>(TurnResponse { completion, chat: ChatView::of(&session) })
    })
    .await??;
    Ok(Json(response))
}

// ── Retrieval & attachments ───────────────────────────────────────────────────

fn retrieval_view(state: &AppState, session: &ChatSession) -> RetrievalView {
    RetrievalView {
        config: session.retrieval_config(),
        direct_text: session.direct_text().to_string(),
        document: session.uploaded_document().map(DocumentSummary::from),
        knowledge_base_available: state.service().knowledge_base_available(),
    }
}

async fn extract_upload(name: String, body: Bytes) -> Result<ExtractedDocument, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::EmptyField { field_name: "name".to_string() });
    }
    tokio::task::spawn_blocking(move || extract_document(&name, &body))
        .await
        .map_err(|e| AppError::Unexpected(format!("Document extraction task failed: {e}")))
}

/// GET `/api/retrieval`
pub async fn get_retrieval_handler(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Json<RetrievalView> {
    let session = current.session.lock().await;
    Json(retrieval_view(&state, &session))
}

/// PUT `/api/retrieval`
pub async fn update_retrieval_handler(
    State(state): State<AppState>,
    current: CurrentSession,
    Json(update): Json<RetrievalUpdate>,
) -> Json<RetrievalView> {
    let mut session = current.session.lock().await;
    let mut config = session.retrieval_config();
    if let Some(enabled) = update.enabled {
        config.enabled = enabled;
    }
    if let Some(source) = update.source {
        config.source = source;
    }
    session.set_retrieval_config(config);
    if let Some(text) = update.direct_text {
        session.set_direct_text(text);
    }
    Json(retrieval_view(&state, &session))
}

/// POST `/api/retrieval/document?name=<file name>` with the raw file as body.
pub async fn upload_document_handler(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(file): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<RetrievalView>, AppError> {
    let document = extract_upload(file.name, body).await?;
    let mut session = current.session.lock().await;
    session.set_uploaded_document(Some(document));
    Ok(Json(retrieval_view(&state, &session)))
}

/// DELETE `/api/retrieval/document`
pub async fn clear_document_handler(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Json<RetrievalView> {
    let mut session = current.session.lock().await;
    session.set_uploaded_document(None);
    Json(retrieval_view(&state, &session))
}

/// POST `/api/attachment?name=<file name>`: attaches a file to the next message.
pub async fn attach_handler(
    current: CurrentSession,
    Query(file): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<DocumentSummary>, AppError> {
    let document = extract_upload(file.name, body).await?;
    let summary = DocumentSummary::from(&document);
    current.session.lock().await.attach(document);
    Ok(Json(summary))
}

/// DELETE `/api/attachment`
pub async fn detach_handler(current: CurrentSession) -> StatusCode {
    current.session.lock().await.clear_attachment();
    StatusCode::NO_CONTENT
}
