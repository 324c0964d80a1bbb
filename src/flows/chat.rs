use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::unless_cancelled;
use crate::api::{Backend, ChatRequest, HistoryEntry, Role, TranslateRequest};
use crate::session::SessionStore;

/// Assistant turn appended when the chat request fails.
pub const CHAT_ERROR_REPLY: &str =
    "Sorry, there was an error processing your request. Please try again.";
/// Assistant turn appended when the backend answers without a reply.
pub const CHAT_EMPTY_REPLY: &str = "Sorry, I could not process your request.";
/// Notice when translate is requested with nothing selected.
pub const NO_SELECTION_NOTICE: &str = "Please select text to translate";
/// Notice when the translate request fails.
pub const TRANSLATE_ERROR_NOTICE: &str = "Error translating text";

/// One message in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None, Utc::now())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), None, Utc::now())
    }

    fn new(
        role: Role,
        content: String,
        sources: Option<Vec<String>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            sources,
            timestamp,
        }
    }

    fn as_history(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Parse a backend timestamp.
///
/// The backend sends naive ISO-8601 local times; those are read as UTC.
/// Anything unparseable becomes "now".
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Utc::now();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Source of "the reader finished selecting text" notifications.
pub trait SelectionProvider: Send + Sync {
    /// Receiver whose value is the latest non-empty selection.
    fn subscribe(&self) -> watch::Receiver<String>;
}

/// [`SelectionProvider`] fed by the host's platform listener.
#[derive(Clone)]
pub struct SelectionSource {
    sender: Arc<watch::Sender<String>>,
}

impl Default for SelectionSource {
    fn default() -> Self {
        let (sender, _) = watch::channel(String::new());
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl SelectionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a finished selection. Empty selections are ignored.
    pub fn publish(&self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.sender.send_replace(text);
    }
}

impl SelectionProvider for SelectionSource {
    fn subscribe(&self) -> watch::Receiver<String> {
        self.sender.subscribe()
    }
}

/// Result of [`ChatFlow::send_message`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, nothing sent.
    Ignored,
    /// A previous message is still waiting for its reply.
    Busy,
    /// The assistant's reply was appended.
    Replied,
    /// The request failed; the apology turn was appended.
    Failed,
    /// The flow was torn down before the reply arrived.
    Cancelled,
}

/// Result of [`ChatFlow::translate_selection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateOutcome {
    Translated,
    /// Blocking notice for the reader.
    Notice(String),
    Cancelled,
}

#[derive(Default)]
struct ChatState {
    transcript: Vec<Turn>,
    loading: bool,
    pending_selection: Option<String>,
    selection: Option<watch::Receiver<String>>,
}

impl ChatState {
    /// Pull in any selection published since the last look.
    fn sync_selection(&mut self) {
        let Some(receiver) = self.selection.as_mut() else {
            return;
        };
        if receiver.has_changed().unwrap_or(false) {
            let text = receiver.borrow_and_update().clone();
            if !text.trim().is_empty() {
                self.pending_selection = Some(text);
            }
        }
    }
}

/// Book assistant conversation.
///
/// Clones share the transcript, so a view can read it while a reply is
/// pending. Only one message is in flight at a time.
#[derive(Clone)]
pub struct ChatFlow {
    backend: Arc<dyn Backend>,
    session: SessionStore,
    state: Arc<RwLock<ChatState>>,
    target_language: String,
    cancel: CancellationToken,
}

impl ChatFlow {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: SessionStore,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            state: Arc::new(RwLock::new(ChatState::default())),
            target_language: target_language.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Capture selections reported by `provider`, replacing any earlier one.
    ///
    /// Waits for readers holding the view state to finish.
    pub async fn attach_selection(&self, provider: &dyn SelectionProvider) {
        // A fresh receiver has already seen the current value, so only
        // selections made from now on count.
        let receiver = provider.subscribe();
        self.state.write().await.selection = Some(receiver);
        debug!("Selection capture attached");
    }

    /// Snapshot of the transcript
    pub async fn transcript(&self) -> Vec<Turn> {
        self.state.read().await.transcript.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    /// Selection that will ride along with the next message
    pub async fn pending_selection(&self) -> Option<String> {
        let mut state = self.state.write().await;
        state.sync_selection();
        state.pending_selection.clone()
    }

    /// Drop the pending selection without sending it
    pub async fn clear_selection(&self) {
        let mut state = self.state.write().await;
        state.sync_selection();
        state.pending_selection = None;
    }

    /// Send `text` with the prior transcript and any pending selection.
    ///
    /// The user turn is appended immediately; exactly one assistant turn
    /// follows, either the reply or a fixed apology.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let (history, selected_text) = {
            let mut state = self.state.write().await;
            if state.loading {
                return SendOutcome::Busy;
            }
            state.sync_selection();

            let history: Vec<HistoryEntry> =
                state.transcript.iter().map(Turn::as_history).collect();
            state.transcript.push(Turn::user(text));
            state.loading = true;
            (history, state.pending_selection.clone())
        };

        let session = self.session.get().await;
        let request = ChatRequest {
            message: text.to_string(),
            user_id: session.email.clone(),
            selected_text,
            conversation_history: history,
        };
        debug!(
            history = request.conversation_history.len(),
            with_selection = request.selected_text.is_some(),
            "Sending chat message"
        );

        let result = unless_cancelled(
            &self.cancel,
            self.backend.chat(session.token.as_deref(), &request),
        )
        .await;

        let mut state = self.state.write().await;
        state.loading = false;

        match result {
            None => SendOutcome::Cancelled,
            Some(Ok(response)) => {
                let content = response.text().unwrap_or(CHAT_EMPTY_REPLY).to_string();
                let timestamp = parse_timestamp(response.timestamp.as_deref());
                state.transcript.push(Turn::new(
                    Role::Assistant,
                    content,
                    response.sources,
                    timestamp,
                ));
                state.pending_selection = None;
                info!(turns = state.transcript.len(), "Chat reply received");
                SendOutcome::Replied
            }
            Some(Err(e)) => {
                error!(error = %e, "Chat request failed");
                state.transcript.push(Turn::assistant(CHAT_ERROR_REPLY));
                SendOutcome::Failed
            }
        }
    }

    /// Translate the pending selection into the configured language and
    /// append it as an assistant turn.
    pub async fn translate_selection(&self) -> TranslateOutcome {
        let Some(selection) = self.pending_selection().await else {
            return TranslateOutcome::Notice(NO_SELECTION_NOTICE.to_string());
        };

        let token = self.session.token().await;
        let request = TranslateRequest::new(selection, self.target_language.clone());
        let result = unless_cancelled(
            &self.cancel,
            self.backend.translate(token.as_deref(), &request),
        )
        .await;

        let response = match result {
            None => return TranslateOutcome::Cancelled,
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                error!(error = %e, "Translation failed");
                return TranslateOutcome::Notice(TRANSLATE_ERROR_NOTICE.to_string());
            }
        };
        let Some(translated) = response.text() else {
            error!("Translation response carried no text");
            return TranslateOutcome::Notice(TRANSLATE_ERROR_NOTICE.to_string());
        };

        let content = format!(
            "Translation to {}:\n\n{}",
            capitalize(&self.target_language),
            translated
        );
        let timestamp = parse_timestamp(response.timestamp.as_deref());

        let mut state = self.state.write().await;
        state
            .transcript
            .push(Turn::new(Role::Assistant, content, None, timestamp));
        state.pending_selection = None;
        TranslateOutcome::Translated
    }

    /// Drop any in-flight request; its reply is never appended.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::ScriptedBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn build(backend: ScriptedBackend) -> (ChatFlow, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let flow = ChatFlow::new(backend.clone(), SessionStore::in_memory(), "urdu");
        (flow, backend)
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let (flow, backend) = build(ScriptedBackend::new());

        assert_eq!(flow.send_message("").await, SendOutcome::Ignored);
        assert_eq!(flow.send_message("   \n\t").await, SendOutcome::Ignored);

        assert!(flow.transcript().await.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reply_is_appended_after_user_turn() {
        let (flow, _) = build(ScriptedBackend::new().reply(json!({
            "message": "ROS 2 is a robotics middleware.",
            "sources": ["Chapter 1"],
            "timestamp": "2024-05-01T10:00:00.123456"
        })));

        assert_eq!(flow.send_message("What is ROS 2?").await, SendOutcome::Replied);

        let transcript = flow.transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].content, "What is ROS 2?");
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, "ROS 2 is a robotics middleware.");
        assert_eq!(transcript[1].sources, Some(vec!["Chapter 1".to_string()]));
        assert_eq!(
            transcript[1].timestamp.to_rfc3339(),
            "2024-05-01T10:00:00.123456+00:00"
        );
        assert!(!flow.is_loading().await);
    }

    #[tokio::test]
    async fn test_failure_appends_single_apology() {
        let (flow, _) = build(
            ScriptedBackend::new()
                .fail(500, Some("boom"))
                .reply(json!({"response": "second answer"})),
        );

        assert_eq!(flow.send_message("first").await, SendOutcome::Failed);
        assert_eq!(flow.transcript().await.len(), 2);
        assert_eq!(flow.transcript().await[1].content, CHAT_ERROR_REPLY);

        assert_eq!(flow.send_message("second").await, SendOutcome::Replied);
        let transcript = flow.transcript().await;
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[3].content, "second answer");
    }

    #[tokio::test]
    async fn test_history_strips_sources_and_excludes_new_message() {
        let (flow, backend) = build(
            ScriptedBackend::new()
                .reply(json!({"message": "a1", "sources": ["s"]}))
                .reply(json!({"message": "a2"})),
        );

        flow.send_message("q1").await;
        flow.send_message("q2").await;

        let calls = backend.calls();
        assert_eq!(calls[0].body["conversation_history"], json!([]));
        assert_eq!(
            calls[1].body["conversation_history"],
            json!([
                {"role": "user", "content": "q1"},
                {"role": "assistant", "content": "a1"}
            ])
        );
        assert_eq!(calls[1].body["message"], json!("q2"));
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback_text() {
        let (flow, _) = build(ScriptedBackend::new().reply(json!({})));
        flow.send_message("hello").await;
        assert_eq!(flow.transcript().await[1].content, CHAT_EMPTY_REPLY);
    }

    #[tokio::test]
    async fn test_empty_response_field_does_not_hide_message() {
        let (flow, _) = build(
            ScriptedBackend::new().reply(json!({"message": "real answer", "response": ""})),
        );
        flow.send_message("q").await;
        assert_eq!(flow.transcript().await[1].content, "real answer");
    }

    #[tokio::test]
    async fn test_selection_rides_along_and_clears_on_success() {
        let selection = SelectionSource::new();
        let (flow, backend) = build(
            ScriptedBackend::new()
                .reply(json!({"message": "explained"}))
                .reply(json!({"message": "again"})),
        );
        flow.attach_selection(&selection).await;

        selection.publish("");
        assert_eq!(flow.pending_selection().await, None);

        selection.publish("tf2 transforms");
        flow.send_message("Explain this").await;
        flow.send_message("And now?").await;

        let calls = backend.calls();
        assert_eq!(calls[0].body["selected_text"], json!("tf2 transforms"));
        assert!(calls[1].body.get("selected_text").is_none());
        assert_eq!(flow.pending_selection().await, None);
    }

    #[tokio::test]
    async fn test_attach_waits_for_busy_state() {
        let selection = SelectionSource::new();
        let (flow, _) = build(ScriptedBackend::new());

        let reader = {
            let state = flow.state.clone();
            let held = state.read_owned().await;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                drop(held);
            })
        };

        flow.attach_selection(&selection).await;
        reader.await.unwrap();

        selection.publish("ros2 launch");
        assert_eq!(flow.pending_selection().await.as_deref(), Some("ros2 launch"));
    }

    #[tokio::test]
    async fn test_selection_kept_after_failed_send() {
        let selection = SelectionSource::new();
        let (flow, _) = build(ScriptedBackend::new().fail(503, None));
        flow.attach_selection(&selection).await;

        selection.publish("kinematics");
        flow.send_message("why?").await;

        assert_eq!(flow.pending_selection().await.as_deref(), Some("kinematics"));
    }

    #[tokio::test]
    async fn test_second_send_while_loading_is_refused() {
        let (flow, _) = build(
            ScriptedBackend::new()
                .with_delay(Duration::from_millis(100))
                .reply(json!({"message": "slow"})),
        );

        let first = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.send_message("first").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(flow.is_loading().await);
        assert_eq!(flow.send_message("second").await, SendOutcome::Busy);
        assert_eq!(first.await.unwrap(), SendOutcome::Replied);
        assert_eq!(flow.transcript().await.len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_drops_late_reply() {
        let (flow, _) = build(
            ScriptedBackend::new()
                .with_delay(Duration::from_millis(200))
                .reply(json!({"message": "too late"})),
        );

        let pending = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.send_message("hello").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        flow.teardown();

        assert_eq!(pending.await.unwrap(), SendOutcome::Cancelled);
        assert_eq!(flow.transcript().await.len(), 1);
    }

    #[tokio::test]
    async fn test_translate_requires_selection() {
        let (flow, backend) = build(ScriptedBackend::new());
        assert_eq!(
            flow.translate_selection().await,
            TranslateOutcome::Notice(NO_SELECTION_NOTICE.to_string())
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_translate_appends_translation_turn() {
        let selection = SelectionSource::new();
        let (flow, backend) = build(ScriptedBackend::new().reply(json!({"translated": "ترجمہ"})));
        flow.attach_selection(&selection).await;
        selection.publish("translation");

        assert_eq!(flow.translate_selection().await, TranslateOutcome::Translated);

        let transcript = flow.transcript().await;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "Translation to Urdu:\n\nترجمہ");
        assert_eq!(
            backend.calls()[0].body,
            json!({"text": "translation", "target_language": "urdu"})
        );
        assert_eq!(flow.pending_selection().await, None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let rfc = parse_timestamp(Some("2024-05-01T10:00:00Z"));
        assert_eq!(rfc.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        let naive = parse_timestamp(Some("2024-05-01T10:00:00"));
        assert_eq!(naive.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        let before = Utc::now();
        assert!(parse_timestamp(Some("yesterday")) >= before);
        assert!(parse_timestamp(None) >= before);
    }
}
