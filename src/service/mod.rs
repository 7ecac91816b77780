pub mod chat_service;
pub mod title;

pub use chat_service::{ChatPhase, ChatService, ChatSession};
