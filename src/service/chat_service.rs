use serde::Serialize;
use tracing::{debug, info};

use crate::agent::{Completion, ModelInvoker, PromptAssembler};
use crate::documents::{format_context, ExtractedDocument};
use crate::errors::AppError;
use crate::models::{Chat, ChatHistory, Message, MessageRole, RetrievalConfig, RetrievalSource};
use crate::retrieval::RetrievalAdapter;
use crate::service::title::{default_title, derive_title};

pub const DIRECT_TEXT_LABEL: &str = "Contexto do Usuário";
pub const KNOWLEDGE_BASE_LABEL: &str = "Base de conhecimento";

/// Handles shared by every session: the invoker, the assembler and the
/// knowledge-base adapter. Cheap to clone.
#[derive(Clone)]
pub struct ChatService {
    invoker: ModelInvoker,
    assembler: PromptAssembler,
    retrieval: RetrievalAdapter,
    top_k: usize,
}

impl ChatService {
    pub fn new(
        invoker: ModelInvoker,
        assembler: PromptAssembler,
        retrieval: RetrievalAdapter,
        top_k: usize,
    ) -> Self {
        Self { invoker, assembler, retrieval, top_k }
    }

    pub fn knowledge_base_available(&self) -> bool {
        self.retrieval.is_available()
    }

    /// Starts an isolated session holding one empty active chat.
    pub fn open_session(&self) -> ChatSession {
        ChatSession::new(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Idle,
    AwaitingResponse,
}

/// Per-user conversation state. Every mutating operation takes `&mut self`,
/// so at most one turn is in flight per session.
pub struct ChatSession {
    service: ChatService,
    history: ChatHistory,
    phase: ChatPhase,
    retrieval: RetrievalConfig,
    uploaded_document: Option<ExtractedDocument>,
    direct_text: String,
    pending_attachment: Option<ExtractedDocument>,
}

impl ChatSession {
    pub fn new(service: ChatService) -> Self {
        let mut session = Self {
            service,
            history: ChatHistory::new(),
            phase: ChatPhase::Idle,
            retrieval: RetrievalConfig::default(),
            uploaded_document: None,
            direct_text: String::new(),
            pending_attachment: None,
        };
        session.create_chat();
        session
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.history.active()
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        self.retrieval
    }

    pub fn set_retrieval_config(&mut self, config: RetrievalConfig) {
        self.retrieval = config;
    }

    pub fn direct_text(&self) -> &str {
        &self.direct_text
    }

    pub fn set_direct_text(&mut self, text: impl Into<String>) {
        self.direct_text = text.into();
    }

    pub fn uploaded_document(&self) -> Option<&ExtractedDocument> {
        self.uploaded_document.as_ref()
    }

    pub fn set_uploaded_document(&mut self, document: Option<ExtractedDocument>) {
        self.uploaded_document = document;
    }

    pub fn pending_attachment(&self) -> Option<&ExtractedDocument> {
        self.pending_attachment.as_ref()
    }

    /// Attaches a document to the next submitted message only.
    pub fn attach(&mut self, document: ExtractedDocument) {
        self.pending_attachment = Some(document);
    }

    pub fn clear_attachment(&mut self) {
        self.pending_attachment = None;
    }

    // ── Chat management ──────────────────────────────────────────────────────

    /// Appends an empty chat with a dated default title and activates it.
    pub fn create_chat(&mut self) -> usize {
        let index = self.history.push_active(Chat::new(default_title()));
        debug!(index, "Created chat");
        index
    }

    pub fn load_chat(&mut self, index: usize) -> Result<&Chat, AppError> {
        self.history.activate(index)
    }

    /// Removes a chat. Deleting the last remaining chat starts a fresh one.
    pub fn delete_chat(&mut self, index: usize) -> Result<(), AppError> {
        let removed = self.history.remove(index)?;
        info!(index, title = %removed.title, "Deleted chat");
        if self.history.is_empty() {
            self.create_chat();
        }
        Ok(())
    }

    pub fn rename_chat(&mut self, index: usize, title: &str) -> Result<(), AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::EmptyField { field_name: "title".to_string() });
        }
        let chat = self.history.get_mut(index)?;
        chat.title = title.to_string();
        chat.titled = true;
        Ok(())
    }

    fn ensure_active(&mut self) -> usize {
        match self.history.active_index() {
            Some(index) => index,
            None => self.create_chat(),
        }
    }

    // ── Turns ────────────────────────────────────────────────────────────────

    /// Sends a user message on the active chat. Returns `None` without
    /// touching the log when the text is blank, or when it repeats the last
    /// user message and no attachment is pending. The pending attachment is
    /// consumed either way.
    pub async fn submit(&mut self, text: &str) -> Option<Completion> {
        let attachment = self.pending_attachment.take();
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return None;
        }

        let chat_index = self.ensure_active();
        let chat = self.history.get_mut(chat_index).ok()?;
        let repeated = chat.last_user_message().is_some_and(|m| m.content == text);
        if repeated && attachment.is_none() {
            debug!("Ignoring repeated message on chat {chat_index}");
            return None;
        }

        let history = chat.messages.clone();
        let session_id = chat.id.clone();
        let mut message = Message::user(&text);
        if let Some(doc) = &attachment {
            message = message.with_attachment(&doc.name);
        }
        chat.messages.push(message);
        self.phase = ChatPhase::AwaitingResponse;

        let mut context = self.resolve_context(&text).await;
        if let Some(doc) = &attachment {
            let attached =
                format_context(&doc.text, &format!("Conteúdo do arquivo anexado ({})", doc.name));
            context = if context.is_empty() { attached } else { format!("{context}\n\n{attached}") };
        }

        let prompt = self.service.assembler.assemble(&text, &history, &context);
        let completion = self.service.invoker.invoke(&prompt, &session_id, None).await;

        if let Ok(chat) = self.history.get_mut(chat_index) {
            chat.messages.push(Message::assistant(&completion.answer));
            record(chat, &completion);
        }
        self.phase = ChatPhase::Idle;
        Some(completion)
    }

    /// Re-answers user message `index` using only the turns before it.
    /// A directly following assistant message is replaced, otherwise the new
    /// answer is inserted right after the user message.
    pub async fn regenerate(&mut self, index: usize) -> Result<Completion, AppError> {
        let chat_index = self.ensure_active();
        let chat = self.history.get_mut(chat_index)?;
        let message = chat.messages.get(index).ok_or(AppError::MessageIndexOutOfRange {
            index,
            len: chat.messages.len(),
        })?;
        if !message.is_user() {
            return Err(AppError::NotAUserMessage { index });
        }

        let query = message.content.clone();
        let history = chat.messages[..index].to_vec();
        let session_id = chat.id.clone();
        self.phase = ChatPhase::AwaitingResponse;

        let context = self.resolve_context(&query).await;
        let prompt = self.service.assembler.assemble(&query, &history, &context);
        let completion = self.service.invoker.invoke(&prompt, &session_id, None).await;

        let chat = self.history.get_mut(chat_index)?;
        let reply = Message::assistant(&completion.answer);
        if chat.messages.get(index + 1).is_some_and(|next| !next.is_user()) {
            chat.messages[index + 1] = reply;
        } else {
            chat.messages.insert(index + 1, reply);
        }
        record(chat, &completion);
        self.phase = ChatPhase::Idle;
        Ok(completion)
    }

    /// Rewrites message `index`. Editing a user message drops its answer and
    /// regenerates it; editing an assistant message only changes the text.
    pub async fn edit(
        &mut self,
        index: usize,
        content: &str,
    ) -> Result<Option<Completion>, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "content".to_string() });
        }

        let chat_index = self.ensure_active();
        let chat = self.history.get_mut(chat_index)?;
        let len = chat.messages.len();
        let message = chat
            .messages
            .get_mut(index)
            .ok_or(AppError::MessageIndexOutOfRange { index, len })?;

        message.edited = true;
        if message.role == MessageRole::Assistant {
            message.content = content.to_string();
            return Ok(None);
        }
        message.content = normalize_whitespace(content);

        if chat.messages.get(index + 1).is_some_and(|m| !m.is_user()) {
            chat.messages.remove(index + 1);
        }
        self.regenerate(index).await.map(Some)
    }

    async fn resolve_context(&self, query: &str) -> String {
        if !self.retrieval.enabled {
            return String::new();
        }
        match self.retrieval.source {
            RetrievalSource::Upload => self
                .uploaded_document
                .as_ref()
                .map(|doc| format_context(&doc.text, &doc.context_label()))
                .unwrap_or_default(),
            RetrievalSource::DirectText if self.direct_text.trim().is_empty() => String::new(),
            RetrievalSource::DirectText => format_context(&self.direct_text, DIRECT_TEXT_LABEL),
            RetrievalSource::IndexedStore => {
                let chunks = self.service.retrieval.retrieve(query, self.service.top_k).await;
                format_context(&chunks, KNOWLEDGE_BASE_LABEL)
            }
        }
    }
}

/// Binds the chat to the completion's session, accumulates usage and names
/// the chat after its first successful answer.
fn record(chat: &mut Chat, completion: &Completion) {
    chat.id = completion.session_id.clone();
    chat.usage.add(completion.usage);
    if !chat.titled && !completion.is_error() {
        chat.title = derive_title(&completion.answer);
        chat.titled = true;
    }
}

/// Collapses whitespace runs into single spaces and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::tests::ScriptedEngine;
    use crate::agent::{PromptMessage, SamplingParams, FALLBACK_ANSWER};
    use crate::documents::extract_document;
    use crate::retrieval::tests::keyword_adapter;

    const SYSTEM: &str = "Você é um assistente de TI.";

    fn session_with(engine: Arc<ScriptedEngine>, retrieval: RetrievalAdapter) -> ChatSession {
        let invoker = ModelInvoker::new(engine, SamplingParams::default());
        ChatService::new(invoker, PromptAssembler::new(SYSTEM), retrieval, 2).open_session()
    }

    fn session(answers: &[&str]) -> (ChatSession, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine::answering(answers));
        (session_with(engine.clone(), RetrievalAdapter::unavailable()), engine)
    }

    fn messages(session: &ChatSession) -> Vec<(MessageRole, String)> {
        session
            .active_chat()
            .unwrap()
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn first_turn_binds_session_and_titles_chat() {
        let (mut s, engine) = session(&["Reinicie o roteador. Isso resolve 90% dos casos."]);
        let out = s.submit("oi").await.unwrap();

        assert_eq!(
            engine.last_call(),
            vec![PromptMessage::system(SYSTEM), PromptMessage::user("oi")]
        );
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.id, out.session_id);
        assert!(!chat.id.is_empty());
        assert_eq!(chat.title, "Reinicie o roteador");
        assert_eq!(s.phase(), ChatPhase::Idle);
    }

    #[tokio::test]
    async fn repeated_or_blank_message_is_a_no_op() {
        let (mut s, engine) = session(&["resposta"]);
        s.submit("oi").await.unwrap();
        assert!(s.submit("  oi ").await.is_none());
        assert!(s.submit(" \n\t").await.is_none());
        assert_eq!(engine.call_count(), 1);
        assert_eq!(s.active_chat().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn whitespace_is_normalized_before_storing() {
        let (mut s, engine) = session(&["ok"]);
        s.submit("  como   configurar\n a  vpn ").await.unwrap();
        assert_eq!(messages(&s)[0].1, "como configurar a vpn");
        assert_eq!(engine.last_call()[1], PromptMessage::user("como configurar a vpn"));
    }

    #[tokio::test]
    async fn later_turns_carry_history_and_keep_session() {
        let (mut s, engine) = session(&["a1", "a2"]);
        let first = s.submit("q1").await.unwrap();
        let second = s.submit("q2").await.unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(
            engine.last_call(),
            vec![
                PromptMessage::system(SYSTEM),
                PromptMessage::user("q1"),
                PromptMessage::assistant("a1"),
                PromptMessage::user("q2"),
            ]
        );
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.usage.total_tokens, 30);
        assert_eq!(chat.title, "A1");
    }

    #[tokio::test]
    async fn regenerate_replaces_following_answer() {
        let (mut s, engine) = session(&["a1", "a2", "a1 novo"]);
        s.submit("q1").await.unwrap();
        s.submit("q2").await.unwrap();

        s.regenerate(0).await.unwrap();
        assert_eq!(
            engine.last_call(),
            vec![PromptMessage::system(SYSTEM), PromptMessage::user("q1")]
        );
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert_eq!(chat.count_role(MessageRole::User), 2);
        assert_eq!(chat.count_role(MessageRole::Assistant), 2);
        assert_eq!(chat.messages[1].content, "a1 novo");
    }

    #[tokio::test]
    async fn regenerate_rejects_bad_indices() {
        let (mut s, _) = session(&["a1"]);
        s.submit("q1").await.unwrap();
        assert!(matches!(s.regenerate(1).await, Err(AppError::NotAUserMessage { index: 1 })));
        assert!(matches!(
            s.regenerate(7).await,
            Err(AppError::MessageIndexOutOfRange { index: 7, len: 2 })
        ));
    }

    #[tokio::test]
    async fn editing_user_message_regenerates_its_answer() {
        let (mut s, engine) = session(&["a1", "a2", "a1 revisada"]);
        s.submit("q1").await.unwrap();
        s.submit("q2").await.unwrap();

        let out = s.edit(0, "q1 corrigida").await.unwrap().unwrap();
        assert_eq!(out.answer, "a1 revisada");
        assert_eq!(
            engine.last_call(),
            vec![PromptMessage::system(SYSTEM), PromptMessage::user("q1 corrigida")]
        );
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert!(chat.messages[0].edited);
        assert_eq!(chat.messages[1].content, "a1 revisada");
        assert_eq!(chat.messages[2].content, "q2");
    }

    #[tokio::test]
    async fn editing_assistant_message_does_not_invoke() {
        let (mut s, engine) = session(&["a1"]);
        s.submit("q1").await.unwrap();
        assert!(s.edit(1, "resposta ajustada").await.unwrap().is_none());
        assert_eq!(engine.call_count(), 1);
        assert_eq!(messages(&s)[1].1, "resposta ajustada");
        assert!(matches!(s.edit(0, "   ").await, Err(AppError::EmptyField { .. })));
    }

    #[tokio::test]
    async fn deleting_only_chat_starts_a_new_one() {
        let (mut s, _) = session(&["a1"]);
        s.submit("q1").await.unwrap();
        s.delete_chat(0).unwrap();
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().active_index(), Some(0));
        assert!(s.active_chat().unwrap().messages.is_empty());
        assert!(s.active_chat().unwrap().title.starts_with("Nova Conversa ("));
    }

    #[tokio::test]
    async fn chats_are_isolated_and_reloadable() {
        let (mut s, _) = session(&["a1", "b1"]);
        s.submit("q1").await.unwrap();
        s.create_chat();
        s.submit("outra").await.unwrap();
        assert_eq!(s.history().len(), 2);

        let first = s.load_chat(0).unwrap();
        assert_eq!(first.messages[0].content, "q1");
        assert!(matches!(s.load_chat(5), Err(AppError::ChatNotFound { index: 5 })));
    }

    #[tokio::test]
    async fn failed_turn_appends_fallback_and_keeps_default_title() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.push(Err(AppError::InferenceError { message: "timeout".into() }));
        let mut s = session_with(engine, RetrievalAdapter::unavailable());

        let out = s.submit("oi").await.unwrap();
        assert!(out.is_error());
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.messages[1].content, FALLBACK_ANSWER);
        assert!(!chat.id.is_empty());
        assert!(!chat.titled);

        s.submit("de novo").await.unwrap();
        assert_eq!(s.active_chat().unwrap().title, "Resposta padrão");
    }

    #[tokio::test]
    async fn direct_text_context_precedes_question() {
        let (mut s, engine) = session(&["ok"]);
        s.set_retrieval_config(RetrievalConfig { enabled: true, source: RetrievalSource::DirectText });
        s.set_direct_text("porta 22 bloqueada");
        s.submit("oi").await.unwrap();
        assert_eq!(
            engine.last_call()[1].content,
            "Contexto do Usuário:\nporta 22 bloqueada\n\noi"
        );
    }

    #[tokio::test]
    async fn indexed_store_context_uses_retrieved_chunks() {
        let engine = Arc::new(ScriptedEngine::answering(&["ok"]));
        let (adapter, _) = keyword_adapter(&["Túnel VPN site-to-site", "Wi-Fi corporativo"]);
        let mut s = session_with(engine.clone(), adapter);
        s.set_retrieval_config(RetrievalConfig { enabled: true, source: RetrievalSource::IndexedStore });

        s.submit("vpn caiu").await.unwrap();
        let user = &engine.last_call()[1].content;
        assert!(user.starts_with("Base de conhecimento:\nTúnel VPN site-to-site"));
        assert!(user.ends_with("\n\nvpn caiu"));
    }

    #[tokio::test]
    async fn disabled_retrieval_ignores_configured_sources() {
        let (mut s, engine) = session(&["ok"]);
        s.set_direct_text("ignorado");
        s.set_uploaded_document(Some(extract_document("a.txt", b"conteudo")));
        s.submit("oi").await.unwrap();
        assert_eq!(engine.last_call()[1].content, "oi");
    }

    #[tokio::test]
    async fn uploaded_document_is_labeled_by_kind() {
        let (mut s, engine) = session(&["ok"]);
        s.set_retrieval_config(RetrievalConfig { enabled: true, source: RetrievalSource::Upload });
        s.set_uploaded_document(Some(extract_document("rede.txt", b"vlan 10")));
        s.submit("oi").await.unwrap();
        assert_eq!(
            engine.last_call()[1].content,
            "Contexto do arquivo TXT: rede.txt:\nvlan 10\n\noi"
        );
    }

    #[tokio::test]
    async fn attachment_applies_to_one_message() {
        let (mut s, engine) = session(&["a1", "a2"]);
        s.attach(extract_document("log.txt", b"erro 503"));
        s.submit("veja o log").await.unwrap();

        assert_eq!(
            engine.last_call()[1].content,
            "Conteúdo do arquivo anexado (log.txt):\nerro 503\n\nveja o log"
        );
        assert_eq!(
            s.active_chat().unwrap().messages[0].attachment.as_deref(),
            Some("log.txt")
        );
        assert!(s.pending_attachment().is_none());

        s.submit("e agora").await.unwrap();
        assert_eq!(engine.last_call().last().unwrap().content, "e agora");
    }

    #[tokio::test]
    async fn blank_submit_still_clears_attachment() {
        let (mut s, engine) = session(&["a1"]);
        s.attach(extract_document("x.txt", b"x"));
        assert!(s.submit("   ").await.is_none());
        assert!(s.pending_attachment().is_none());
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn repeated_text_with_new_attachment_is_answered() {
        let (mut s, engine) = session(&["a1", "a2"]);
        s.submit("veja o arquivo").await.unwrap();
        s.attach(extract_document("config.txt", b"interface vlan 20"));

        let out = s.submit("veja o arquivo").await;
        assert_eq!(out.unwrap().answer, "a2");
        assert_eq!(engine.call_count(), 2);
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert_eq!(chat.messages[2].attachment.as_deref(), Some("config.txt"));
        assert!(s.pending_attachment().is_none());
    }

    #[test]
    fn rename_validates_title() {
        let (mut s, _) = session(&[]);
        assert!(matches!(s.rename_chat(0, "  "), Err(AppError::EmptyField { .. })));
        assert!(matches!(s.rename_chat(3, "x"), Err(AppError::ChatNotFound { index: 3 })));
        s.rename_chat(0, " VPN matriz ").unwrap();
        let chat = s.active_chat().unwrap();
        assert_eq!(chat.title, "VPN matriz");
        assert!(chat.titled);
    }
}
