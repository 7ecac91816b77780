pub mod api_routes;
pub mod auth;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::api_routes::{
    active_chat_handler, attach_handler, clear_document_handler, create_chat_handler,
    delete_chat_handler, detach_handler, edit_handler, get_retrieval_handler, list_chats_handler,
    load_chat_handler, regenerate_handler, rename_chat_handler, submit_handler,
    update_retrieval_handler, upload_document_handler,
};
use crate::routes::auth::{login_handler, logout_handler};

pub use auth::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Session gate
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        // Chat management
        .route("/api/chats", get(list_chats_handler).post(create_chat_handler))
        .route("/api/chats/active", get(active_chat_handler))
        .route("/api/chats/{index}", delete(delete_chat_handler))
        .route("/api/chats/{index}/load", post(load_chat_handler))
        .route("/api/chats/{index}/title", put(rename_chat_handler))
        // Turns
        .route("/api/messages", post(submit_handler))
        .route("/api/messages/{index}", put(edit_handler))
        .route("/api/messages/{index}/regenerate", post(regenerate_handler))
        // Context sources
        .route("/api/retrieval", get(get_retrieval_handler).put(update_retrieval_handler))
        .route(
            "/api/retrieval/document",
            post(upload_document_handler).delete(clear_document_handler),
        )
        .route("/api/attachment", post(attach_handler).delete(detach_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
