/// Chat session lifecycle: identity check at mount, store/mirror/dispatcher
/// wiring, polling activation and teardown.
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::Backend;
use crate::dispatcher::Dispatcher;
use crate::error::SessionError;
use crate::mirror::StateMirror;
use crate::poller::{self, PollHandle};
use crate::transcript::{TranscriptEntry, TranscriptStore};
use crate::upload::UploadPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_GREETING: &str =
    "Hello! I'm your Tata Capital Personal Loan Assistant. How can I help you today?";

// ── Identity ──────────────────────────────────────────────────────────────────

/// The `(session_id, user_id)` pair every remote call carries. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    session_id: String,
    user_id: String,
}

impl SessionIdentity {
    pub fn new(session_id: Option<&str>, user_id: Option<&str>) -> Result<Self, SessionError> {
        let present = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let session_id = present(session_id).ok_or(SessionError::MissingIdentity("session_id"))?;
        let user_id = present(user_id).ok_or(SessionError::MissingIdentity("user_id"))?;
        Ok(Self { session_id, user_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    /// Forwarded on every chat request when set
    pub language: Option<String>,
    /// Seeded as the first assistant entry; `None` starts with an empty transcript
    pub greeting: Option<String>,
    pub upload: UploadPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            language: None,
            greeting: Some(DEFAULT_GREETING.to_string()),
            upload: UploadPolicy::default(),
        }
    }
}

// ── Phase ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    /// Terminal: the view was mounted without a usable identity.
    Invalid,
    /// No snapshot yet. Chat input is already usable.
    Loading,
    Ready,
    /// A snapshot is shown while a refresh is outstanding.
    Refreshing,
}

impl SessionPhase {
    /// Phase of a mounted session. Once a snapshot exists this never yields `Loading`.
    pub fn of_mirror(mirror: &StateMirror) -> Self {
        match (mirror.has_snapshot(), mirror.in_flight()) {
            (false, _) => SessionPhase::Loading,
            (true, 0) => SessionPhase::Ready,
            (true, _) => SessionPhase::Refreshing,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "not started",
            SessionPhase::Invalid => "invalid",
            SessionPhase::Loading => "loading",
            SessionPhase::Ready => "ready",
            SessionPhase::Refreshing => "refreshing",
        }
    }
}

// ── ChatSession ───────────────────────────────────────────────────────────────

/// A mounted chat view. Owns the transcript, the mirror and the poller; `close`
/// (or drop) tears all of it down.
pub struct ChatSession {
    identity: SessionIdentity,
    transcript: TranscriptStore,
    mirror: StateMirror,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    poller: Option<PollHandle>,
    shutdown: CancellationToken,
}

impl ChatSession {
    pub fn mount(backend: Arc<dyn Backend>, identity: SessionIdentity, settings: SessionSettings) -> Self {
        let transcript = TranscriptStore::new();
        if let Some(greeting) = settings.greeting.as_deref().filter(|g| !g.trim().is_empty()) {
            transcript.append(TranscriptEntry::assistant(greeting, None));
        }
        let mirror = StateMirror::new(backend.clone(), identity.clone());
        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            backend,
            transcript.clone(),
            mirror.clone(),
            settings.language,
            settings.upload,
            shutdown.child_token(),
        ));
        info!(
            component = "session",
            event = "session.mounted",
            session_id = %identity.session_id(),
            user_id = %identity.user_id(),
        );
        Self {
            identity,
            transcript,
            mirror,
            dispatcher,
            poll_interval: settings.poll_interval,
            poller: None,
            shutdown,
        }
    }

    /// Start polling: one refresh now, then one per interval. Idempotent.
    pub fn activate(&mut self) {
        if self.poller.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        self.poller = Some(poller::activate(self.mirror.clone(), self.poll_interval, &self.shutdown));
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::of_mirror(&self.mirror)
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the poller, detach the mirror and mark in-flight turns as abandoned.
    /// Calls already on the wire are not aborted; their results are discarded.
    pub fn close(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.mirror.detach();
        info!(component = "session", event = "session.closed", session_id = %self.identity.session_id());
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ── ChatView ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub enum ChatView {
    #[default]
    Uninitialized,
    Invalid(SessionError),
    Active(ChatSession),
}

impl ChatView {
    /// Build the view from whatever identity the caller has. A missing half is
    /// terminal; nothing is fetched for an invalid view.
    pub fn mount(
        backend: Arc<dyn Backend>,
        session_id: Option<&str>,
        user_id: Option<&str>,
        settings: SessionSettings,
    ) -> Self {
        match SessionIdentity::new(session_id, user_id) {
            Ok(identity) => ChatView::Active(ChatSession::mount(backend, identity, settings)),
            Err(err) => ChatView::Invalid(err),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self {
            ChatView::Uninitialized => SessionPhase::Uninitialized,
            ChatView::Invalid(_) => SessionPhase::Invalid,
            ChatView::Active(session) => session.phase(),
        }
    }

    pub fn session(&self) -> Option<&ChatSession> {
        match self {
            ChatView::Active(session) => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut ChatSession> {
        match self {
            ChatView::Active(session) => Some(session),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TurnOutcome;
    use crate::error::UploadError;
    use crate::mirror::RefreshOutcome;
    use crate::testing::{ScriptedBackend, identity, state_named};
    use crate::transcript::Role;

    fn quiet() -> SessionSettings {
        SessionSettings { poll_interval: Duration::from_secs(3600), ..Default::default() }
    }

    #[test]
    fn test_identity_rejects_missing_or_blank_parts() {
        assert_eq!(
            SessionIdentity::new(None, Some("c1001")).unwrap_err(),
            SessionError::MissingIdentity("session_id")
        );
        assert_eq!(
            SessionIdentity::new(Some("S1"), Some("   ")).unwrap_err(),
            SessionError::MissingIdentity("user_id")
        );
        let id = SessionIdentity::new(Some(" S1 "), Some("c1001")).unwrap();
        assert_eq!(id.session_id(), "S1");
    }

    #[test]
    fn test_invalid_view_is_terminal_and_fetches_nothing() {
        let backend = ScriptedBackend::new();
        let view = ChatView::mount(backend.clone(), Some("S1"), None, quiet());
        assert_eq!(view.phase(), SessionPhase::Invalid);
        assert!(view.session().is_none());
        assert_eq!(backend.network_calls(), 0);
        assert_eq!(ChatView::default().phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn test_invalid_view_message() {
        let ChatView::Invalid(err) = ChatView::mount(ScriptedBackend::new(), None, None, quiet()) else {
            panic!("expected invalid view");
        };
        assert!(err.to_string().starts_with("Invalid Session"));
    }

    #[tokio::test]
    async fn test_phase_moves_loading_ready_refreshing_and_never_back_to_loading() {
        let backend = ScriptedBackend::new();
        backend.push_state_error(ScriptedBackend::network_error());
        let gate = backend.push_gated_state(state_named("Rajesh"));
        let session = ChatSession::mount(backend.clone(), identity(), quiet());

        assert_eq!(session.phase(), SessionPhase::Loading);
        // Failed first refresh stays in Loading.
        assert!(session.mirror().refresh().await.is_err());
        assert_eq!(session.phase(), SessionPhase::Loading);

        let pending = tokio::spawn({
            let mirror = session.mirror().clone();
            async move { mirror.refresh().await }
        });
        backend.wait_for_state_calls(2).await;
        assert_eq!(session.phase(), SessionPhase::Loading);
        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), RefreshOutcome::Applied);
        assert_eq!(session.phase(), SessionPhase::Ready);

        backend.push_state_error(ScriptedBackend::network_error());
        let gate = backend.push_gated_state(state_named("Rajesh"));
        assert!(session.mirror().refresh().await.is_err());
        assert_eq!(session.phase(), SessionPhase::Ready);

        let pending = tokio::spawn({
            let mirror = session.mirror().clone();
            async move { mirror.refresh().await }
        });
        backend.wait_for_state_calls(4).await;
        assert_eq!(session.phase(), SessionPhase::Refreshing);
        gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_close_detaches_mirror_and_is_idempotent() {
        let backend = ScriptedBackend::new();
        let mut session = ChatSession::mount(backend.clone(), identity(), quiet());
        session.activate();
        backend.wait_for_state_calls(1).await;
        session.close();
        session.close();
        assert!(session.is_closed());
        assert!(session.mirror().is_detached());
    }

    #[tokio::test]
    async fn test_customer_selection_to_answered_turn() {
        let backend = ScriptedBackend::new();
        let ticket = backend.create_session("C1001").await.unwrap();
        assert_eq!(ticket.session_id, "S1");
        assert_eq!(ticket.user_id, "c1001");

        let view = ChatView::mount(
            backend.clone(),
            Some(&ticket.session_id),
            Some(&ticket.user_id),
            quiet(),
        );
        let session = view.session().unwrap();
        assert_eq!(session.identity().user_id(), "c1001");
        assert_eq!(session.transcript().len(), 1);

        backend.push_chat("We offer personal, home, and business loans.");
        let report = session.dispatcher().send_text("What loans do you offer?").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Answered);
        report.refresh.unwrap().await.unwrap().unwrap();

        let entries = session.transcript().all();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].role, Role::User);
        assert_eq!(entries[1].content, "What loans do you offer?");
        assert_eq!(entries[2].role, Role::Assistant);
        assert_eq!(entries[2].content, "We offer personal, home, and business loans.");
        assert_eq!(backend.state_calls(), 1);

        let sent = backend.chat_requests();
        assert_eq!(sent[0].session_id, "S1");
        assert_eq!(sent[0].user_id, "c1001");
    }

    #[tokio::test]
    async fn test_oversized_pdf_is_rejected_locally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank_statement.pdf");
        std::fs::File::create(&path).unwrap().set_len(12 * 1024 * 1024).unwrap();

        let backend = ScriptedBackend::new();
        let session = ChatSession::mount(backend.clone(), identity(), quiet());
        let before = session.transcript().len();

        let report = session.dispatcher().upload(&path).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Invalid);
        assert!(report.refresh.is_none());

        let entries = session.transcript().all();
        assert_eq!(entries.len(), before + 1);
        let last = entries.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert_eq!(
            last.content,
            UploadError::TooLarge { size: 0, limit: 0, limit_mb: 10 }.to_string()
        );
        assert_eq!(backend.network_calls(), 0);
    }
}
