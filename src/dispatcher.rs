/// Text and upload turns against the backend.
///
/// A turn is single-flight: while one is in progress every new submission is
/// rejected before it touches the transcript or the network. Within a turn the
/// order is fixed: user entry, remote call, result entry, refresh.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{Backend, ChatRequest};
use crate::error::ApiError;
use crate::mirror::{RefreshOutcome, StateMirror};
use crate::transcript::{TranscriptEntry, TranscriptStore};
use crate::upload::{DocumentUpload, UploadPolicy};

pub const CHAT_FAILED: &str = "Sorry, I encountered an error. Please try again.";
pub const CHAT_UNREACHABLE: &str =
    "Sorry, I couldn't reach the loan assistant. Please check your connection and try again.";
pub const UPLOAD_FAILED: &str = "Sorry, your document could not be uploaded. Please try again.";
pub const UPLOAD_UNREACHABLE: &str =
    "Sorry, I couldn't reach the server to upload your document. Please check your connection and try again.";
pub const UPLOAD_CHAT_FAILED: &str =
    "Your document was uploaded, but I couldn't process it just now. Please ask me to continue.";
pub const UPLOAD_CHAT_UNREACHABLE: &str =
    "Your document was uploaded, but I couldn't reach the loan assistant. Please check your connection and ask me to continue.";
pub const DOWNLOAD_FAILED: &str = "Sorry, the sanction letter could not be downloaded. Please try again.";
pub const NO_SANCTION_LETTER: &str = "No sanction letter has been generated yet.";

/// Why a submission was refused. Refusals have no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnRejected {
    #[error("a message is already being processed")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Assistant entry appended and a refresh triggered.
    Answered,
    /// A remote stage failed; a system entry was appended.
    Failed,
    /// The upload was rejected locally; a system entry was appended.
    Invalid,
    /// The session closed while the call was outstanding; nothing was appended.
    Abandoned,
}

/// System wording for a failed chat stage, by failure kind.
#[derive(Clone, Copy)]
struct ChatFailureText {
    failed: &'static str,
    unreachable: &'static str,
}

const TEXT_TURN: ChatFailureText = ChatFailureText { failed: CHAT_FAILED, unreachable: CHAT_UNREACHABLE };
const UPLOAD_FOLLOW_UP: ChatFailureText =
    ChatFailureText { failed: UPLOAD_CHAT_FAILED, unreachable: UPLOAD_CHAT_UNREACHABLE };

pub type RefreshTask = JoinHandle<Result<RefreshOutcome, ApiError>>;

pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// The refresh triggered by an answered turn.
    pub refresh: Option<RefreshTask>,
}

impl TurnReport {
    fn ended(outcome: TurnOutcome) -> Self {
        Self { outcome, refresh: None }
    }
}

/// Clears the busy flag when the turn ends, however it ends.
struct TurnGuard<'a>(&'a watch::Sender<bool>);

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    transcript: TranscriptStore,
    mirror: StateMirror,
    language: Option<String>,
    policy: UploadPolicy,
    busy: watch::Sender<bool>,
    closed: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        transcript: TranscriptStore,
        mirror: StateMirror,
        language: Option<String>,
        policy: UploadPolicy,
        closed: CancellationToken,
    ) -> Self {
        let (busy, _rx) = watch::channel(false);
        Self { backend, transcript, mirror, language, policy, busy, closed }
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Wakes whenever a turn starts or ends.
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    fn begin(&self) -> Result<TurnGuard<'_>, TurnRejected> {
        if self.closed.is_cancelled() {
            return Err(TurnRejected::Closed);
        }
        let acquired = self.busy.send_if_modified(|busy| {
            if *busy {
                return false;
            }
            *busy = true;
            true
        });
        if acquired { Ok(TurnGuard(&self.busy)) } else { Err(TurnRejected::Busy) }
    }

    // ── Text turn ─────────────────────────────────────────────────────────────

    pub async fn send_text(&self, text: &str) -> Result<TurnReport, TurnRejected> {
        let message = text.trim();
        if message.is_empty() {
            return Err(TurnRejected::EmptyMessage);
        }
        let _turn = self.begin()?;
        Ok(self.chat_turn(message.to_string(), TEXT_TURN).await)
    }

    async fn chat_turn(&self, message: String, failure: ChatFailureText) -> TurnReport {
        let identity = self.mirror.identity();
        self.transcript.append(TranscriptEntry::user(message.clone()));
        let request = ChatRequest {
            session_id: identity.session_id().to_string(),
            user_id: identity.user_id().to_string(),
            message,
            language: self.language.clone(),
        };
        let result = self.backend.send_chat(&request).await;
        if self.closed.is_cancelled() {
            info!(component = "dispatcher", event = "turn.abandoned", session_id = %request.session_id);
            return TurnReport::ended(TurnOutcome::Abandoned);
        }
        match result {
            Ok(reply) => {
                self.transcript.append(TranscriptEntry::assistant(reply.response, reply.agent));
                let refresh = tokio::spawn(self.mirror.issue().run());
                TurnReport { outcome: TurnOutcome::Answered, refresh: Some(refresh) }
            }
            Err(err) => {
                warn!(
                    component = "dispatcher",
                    event = "chat.failed",
                    session_id = %request.session_id,
                    error = %err,
                );
                let text = if err.is_connection() { failure.unreachable } else { failure.failed };
                self.transcript.append(TranscriptEntry::system(text));
                TurnReport::ended(TurnOutcome::Failed)
            }
        }
    }

    // ── Upload turn ───────────────────────────────────────────────────────────

    /// Validate, upload and then chat about a file on disk. Nothing leaves the
    /// machine unless the file passes the size and type checks.
    pub async fn upload(&self, path: &Path) -> Result<TurnReport, TurnRejected> {
        let _turn = self.begin()?;
        match self.policy.load(path).await {
            Ok(document) => Ok(self.upload_turn(document).await),
            Err(err) => {
                self.transcript.append(TranscriptEntry::system(err.to_string()));
                Ok(TurnReport::ended(TurnOutcome::Invalid))
            }
        }
    }

    /// Same as [`upload`](Self::upload) for a document already in memory.
    pub async fn upload_document(&self, document: DocumentUpload) -> Result<TurnReport, TurnRejected> {
        let _turn = self.begin()?;
        if let Err(err) = self.policy.check(&document) {
            self.transcript.append(TranscriptEntry::system(err.to_string()));
            return Ok(TurnReport::ended(TurnOutcome::Invalid));
        }
        Ok(self.upload_turn(document).await)
    }

    async fn upload_turn(&self, document: DocumentUpload) -> TurnReport {
        let identity = self.mirror.identity();
        info!(
            component = "dispatcher",
            event = "upload.started",
            session_id = %identity.session_id(),
            file = %document.file_name,
            size = document.bytes.len(),
        );
        let result = self.backend.upload_document(identity, &document).await;
        if self.closed.is_cancelled() {
            return TurnReport::ended(TurnOutcome::Abandoned);
        }
        match result {
            Ok(receipt) => self.chat_turn(receipt.message, UPLOAD_FOLLOW_UP).await,
            Err(err) => {
                warn!(
                    component = "dispatcher",
                    event = "upload.failed",
                    session_id = %identity.session_id(),
                    error = %err,
                );
                let text = if err.is_connection() { UPLOAD_UNREACHABLE } else { UPLOAD_FAILED };
                self.transcript.append(TranscriptEntry::system(text));
                TurnReport::ended(TurnOutcome::Failed)
            }
        }
    }

    // ── Sanction letter ───────────────────────────────────────────────────────

    /// Save the sanction letter PDF into `dir`. Failures are reported in the
    /// transcript and yield `None`.
    pub async fn download_sanction_letter(&self, dir: &Path) -> Option<PathBuf> {
        let Some(reference) = self
            .mirror
            .snapshot()
            .and_then(|s| s.sanction_reference().map(str::to_string))
        else {
            self.transcript.append(TranscriptEntry::system(NO_SANCTION_LETTER));
            return None;
        };
        let identity = self.mirror.identity();
        let bytes = match self.backend.download_sanction_letter(identity).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(component = "dispatcher", event = "download.failed", error = %err);
                if !self.closed.is_cancelled() {
                    self.transcript.append(TranscriptEntry::system(DOWNLOAD_FAILED));
                }
                return None;
            }
        };
        let path = dir.join(sanction_file_name(&reference));
        if let Err(err) = tokio::fs::write(&path, &bytes).await {
            warn!(component = "dispatcher", event = "download.write_failed", path = %path.display(), error = %err);
            if !self.closed.is_cancelled() {
                self.transcript.append(TranscriptEntry::system(format!(
                    "Could not save the sanction letter to {}: {err}",
                    path.display()
                )));
            }
            return None;
        }
        info!(component = "dispatcher", event = "download.saved", path = %path.display(), size = bytes.len());
        if !self.closed.is_cancelled() {
            self.transcript
                .append(TranscriptEntry::system(format!("Sanction letter saved to {}", path.display())));
        }
        Some(path)
    }
}

/// `sanction_letter_{reference}.pdf`, with path separators replaced.
pub fn sanction_file_name(reference: &str) -> String {
    let safe: String = reference
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("sanction_letter_{safe}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ApplicationState, SanctionLetter};
    use crate::testing::{ScriptedBackend, identity, state_named};
    use crate::transcript::Role;

    struct Fixture {
        backend: Arc<ScriptedBackend>,
        transcript: TranscriptStore,
        mirror: StateMirror,
        closed: CancellationToken,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture() -> Fixture {
        let backend = ScriptedBackend::new();
        let transcript = TranscriptStore::new();
        let mirror = StateMirror::new(backend.clone(), identity());
        let closed = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            backend.clone(),
            transcript.clone(),
            mirror.clone(),
            None,
            UploadPolicy::default(),
            closed.clone(),
        ));
        Fixture { backend, transcript, mirror, closed, dispatcher }
    }

    fn roles(store: &TranscriptStore) -> Vec<Role> {
        store.all().iter().map(|e| e.role).collect()
    }

    #[tokio::test]
    async fn test_successful_turn_appends_user_then_assistant_and_refreshes_once() {
        let f = fixture();
        f.backend.push_chat("Sure, let's get started.");
        f.backend.push_state(state_named("Rajesh Kumar"));

        let report = f.dispatcher.send_text("  I need a loan  ").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Answered);
        assert_eq!(report.refresh.unwrap().await.unwrap().unwrap(), RefreshOutcome::Applied);

        assert_eq!(roles(&f.transcript), [Role::User, Role::Assistant]);
        assert_eq!(f.transcript.all()[0].content, "I need a loan");
        assert_eq!(f.backend.state_calls(), 1);
        assert_eq!(f.mirror.snapshot().unwrap().customer_name, "Rajesh Kumar");
        assert!(!f.dispatcher.is_busy());
    }

    #[tokio::test]
    async fn test_failed_turn_appends_system_entry_and_skips_refresh() {
        let f = fixture();
        f.backend.push_chat_error(ScriptedBackend::server_error());

        let report = f.dispatcher.send_text("hello").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert!(report.refresh.is_none());
        assert_eq!(roles(&f.transcript), [Role::User, Role::System]);
        assert_eq!(f.transcript.all()[1].content, CHAT_FAILED);
        assert_eq!(f.backend.state_calls(), 0);
        assert!(!f.dispatcher.is_busy());
    }

    #[tokio::test]
    async fn test_connection_failure_has_its_own_wording() {
        let f = fixture();
        f.backend.push_chat_error(ScriptedBackend::network_error());
        f.dispatcher.send_text("hello").await.unwrap();
        assert_eq!(f.transcript.all()[1].content, CHAT_UNREACHABLE);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_side_effects() {
        let f = fixture();
        assert_eq!(f.dispatcher.send_text("   \n").await.err(), Some(TurnRejected::EmptyMessage));
        assert!(f.transcript.is_empty());
        assert_eq!(f.backend.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_turn_while_busy_is_rejected() {
        let f = fixture();
        let gate = f.backend.push_gated_chat("first answer");

        let first = tokio::spawn({
            let dispatcher = f.dispatcher.clone();
            async move { dispatcher.send_text("first").await.map(|r| r.outcome) }
        });
        f.backend.wait_for_chat_calls(1).await;
        assert!(f.dispatcher.is_busy());

        assert_eq!(f.dispatcher.send_text("second").await.err(), Some(TurnRejected::Busy));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slip.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(f.dispatcher.upload(&path).await.err(), Some(TurnRejected::Busy));

        assert_eq!(f.transcript.len(), 1);
        assert_eq!(f.backend.chat_calls(), 1);
        assert_eq!(f.backend.upload_calls(), 0);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), Ok(TurnOutcome::Answered));
        assert!(!f.dispatcher.is_busy());
        assert_eq!(roles(&f.transcript), [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_unsupported_type_never_hits_network() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let report = f.dispatcher.upload(&path).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Invalid);
        assert_eq!(roles(&f.transcript), [Role::System]);
        assert_eq!(f.backend.network_calls(), 0);
        assert!(!f.dispatcher.is_busy());
    }

    #[tokio::test]
    async fn test_upload_then_chat_uses_acknowledged_description() {
        let f = fixture();
        f.backend.push_upload("I have uploaded my salary slip: salary_slip.pdf");
        f.backend.push_chat("Thanks, I've verified your salary.");

        let doc = DocumentUpload {
            file_name: "salary_slip.pdf".into(),
            mime: "application/pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        };
        let report = f.dispatcher.upload_document(doc).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Answered);
        report.refresh.unwrap().await.unwrap().unwrap();

        let entries = f.transcript.all();
        assert_eq!(roles(&f.transcript), [Role::User, Role::Assistant]);
        assert_eq!(entries[0].content, "I have uploaded my salary slip: salary_slip.pdf");
        assert_eq!(f.backend.chat_requests()[0].message, entries[0].content);
        assert_eq!(f.backend.state_calls(), 1);
    }

    #[tokio::test]
    async fn test_upload_stage_failure_stops_chain() {
        let f = fixture();
        f.backend.push_upload_error(ScriptedBackend::server_error());
        let doc = DocumentUpload { file_name: "a.png".into(), mime: "image/png".into(), bytes: vec![1, 2, 3] };

        let report = f.dispatcher.upload_document(doc).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert_eq!(roles(&f.transcript), [Role::System]);
        assert_eq!(f.transcript.all()[0].content, UPLOAD_FAILED);
        assert_eq!(f.backend.chat_calls(), 0);
        assert_eq!(f.backend.state_calls(), 0);
    }

    #[tokio::test]
    async fn test_chat_stage_failure_after_upload_keeps_completed_stage() {
        let f = fixture();
        f.backend.push_upload("I have uploaded my PAN card");
        f.backend.push_chat_error(ScriptedBackend::server_error());
        let doc = DocumentUpload { file_name: "pan.jpg".into(), mime: "image/jpeg".into(), bytes: vec![0xFF] };

        let report = f.dispatcher.upload_document(doc).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert_eq!(roles(&f.transcript), [Role::User, Role::System]);
        assert_eq!(f.transcript.all()[1].content, UPLOAD_CHAT_FAILED);
        assert_ne!(UPLOAD_CHAT_FAILED, UPLOAD_FAILED);
    }

    #[tokio::test]
    async fn test_unreachable_chat_after_upload_still_says_uploaded() {
        let f = fixture();
        f.backend.push_upload("I have uploaded my bank statement");
        f.backend.push_chat_error(ScriptedBackend::network_error());
        let doc = DocumentUpload { file_name: "stmt.pdf".into(), mime: "application/pdf".into(), bytes: vec![1] };

        let report = f.dispatcher.upload_document(doc).await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert_eq!(roles(&f.transcript), [Role::User, Role::System]);
        assert_eq!(f.transcript.all()[1].content, UPLOAD_CHAT_UNREACHABLE);
        assert!(UPLOAD_CHAT_UNREACHABLE.starts_with("Your document was uploaded"));
        assert_eq!(f.backend.state_calls(), 0);
    }

    #[tokio::test]
    async fn test_completion_after_close_appends_nothing() {
        let f = fixture();
        let gate = f.backend.push_gated_chat("late answer");

        let turn = tokio::spawn({
            let dispatcher = f.dispatcher.clone();
            async move { dispatcher.send_text("hello").await.map(|r| (r.outcome, r.refresh.is_some())) }
        });
        f.backend.wait_for_chat_calls(1).await;
        f.closed.cancel();
        f.mirror.detach();
        gate.notify_one();

        assert_eq!(turn.await.unwrap(), Ok((TurnOutcome::Abandoned, false)));
        assert_eq!(f.transcript.len(), 1);
        assert_eq!(f.backend.state_calls(), 0);
        assert_eq!(f.dispatcher.send_text("again").await.err(), Some(TurnRejected::Closed));
    }

    #[tokio::test]
    async fn test_refresh_activity_does_not_disturb_transcript_order() {
        let f = fixture();
        for i in 0..5 {
            f.backend.push_chat(&format!("answer {i}"));
        }
        let poller = tokio::spawn({
            let mirror = f.mirror.clone();
            async move {
                for _ in 0..20 {
                    let _ = mirror.refresh().await;
                    tokio::task::yield_now().await;
                }
            }
        });
        for i in 0..5 {
            let report = f.dispatcher.send_text(&format!("question {i}")).await.unwrap();
            let _ = report.refresh.unwrap().await.unwrap();
        }
        poller.await.unwrap();

        let contents: Vec<String> = f.transcript.all().into_iter().map(|e| e.content).collect();
        let expected: Vec<String> =
            (0..5).flat_map(|i| [format!("question {i}"), format!("answer {i}")]).collect();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_download_writes_named_pdf() {
        let f = fixture();
        f.backend.push_state(ApplicationState {
            sanction_letter: Some(SanctionLetter {
                sanction_reference: "SL/2024/42".into(),
                customer_name: "Rajesh Kumar".into(),
                loan_amount: 300000.0,
                interest_rate: 10.5,
                tenure_months: 36,
                emi_amount: 9751.2,
                generated_date: "2024-11-02".into(),
            }),
            ..Default::default()
        });
        f.mirror.refresh().await.unwrap();
        f.backend.set_letter(b"%PDF-1.4 letter".to_vec());

        let dir = tempfile::tempdir().unwrap();
        let path = f.dispatcher.download_sanction_letter(dir.path()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "sanction_letter_SL_2024_42.pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 letter");
        assert_eq!(roles(&f.transcript), [Role::System]);
    }

    #[tokio::test]
    async fn test_download_without_letter_is_reported() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();
        assert!(f.dispatcher.download_sanction_letter(dir.path()).await.is_none());
        assert_eq!(f.transcript.all()[0].content, NO_SANCTION_LETTER);
        assert_eq!(f.backend.download_calls(), 0);
    }
}
