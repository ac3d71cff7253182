//! Scripted in-memory backend for tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::admin::{AdminRows, AdminSession, AdminTable};
use crate::client::{Backend, ChatReply, ChatRequest, Customer, SessionTicket, UploadReceipt};
use crate::error::ApiError;
use crate::session::SessionIdentity;
use crate::state::ApplicationState;
use crate::upload::DocumentUpload;

struct Script<T> {
    result: Result<T, ApiError>,
    gate: Option<Arc<Notify>>,
}

struct Queue<T>(Mutex<VecDeque<Script<T>>>);

impl<T> Queue<T> {
    fn new() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }

    fn push(&self, result: Result<T, ApiError>, gate: Option<Arc<Notify>>) {
        self.0.lock().unwrap().push_back(Script { result, gate });
    }

    fn pop(&self) -> Option<Script<T>> {
        self.0.lock().unwrap().pop_front()
    }
}

async fn play<T>(script: Option<Script<T>>, fallback: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
    match script {
        Some(Script { result, gate }) => {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            result
        }
        None => fallback(),
    }
}

/// Responses are consumed in call order. Unscripted `get_state` calls answer with a
/// default state; other unscripted calls fail with HTTP 500.
pub struct ScriptedBackend {
    states: Queue<ApplicationState>,
    chats: Queue<ChatReply>,
    uploads: Queue<UploadReceipt>,
    customers: Mutex<Vec<Customer>>,
    letter: Mutex<Option<Vec<u8>>>,
    admin_rows: Mutex<Option<AdminRows>>,
    state_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    download_calls: AtomicUsize,
    chat_requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Queue::new(),
            chats: Queue::new(),
            uploads: Queue::new(),
            customers: Mutex::new(Vec::new()),
            letter: Mutex::new(None),
            admin_rows: Mutex::new(None),
            state_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            chat_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn network_error() -> ApiError {
        ApiError::Network { url: "http://test/api".into(), detail: "connection refused".into() }
    }

    pub fn server_error() -> ApiError {
        ApiError::Status { url: "http://test/api".into(), status: 500, body: "internal error".into() }
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    pub fn push_state(&self, state: ApplicationState) {
        self.states.push(Ok(state), None);
    }

    pub fn push_state_error(&self, err: ApiError) {
        self.states.push(Err(err), None);
    }

    pub fn push_gated_state(&self, state: ApplicationState) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.states.push(Ok(state), Some(gate.clone()));
        gate
    }

    pub fn push_gated_error(&self, err: ApiError) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.states.push(Err(err), Some(gate.clone()));
        gate
    }

    pub fn push_chat(&self, response: &str) {
        self.chats.push(Ok(ChatReply { response: response.to_string(), agent: None }), None);
    }

    pub fn push_chat_error(&self, err: ApiError) {
        self.chats.push(Err(err), None);
    }

    pub fn push_gated_chat(&self, response: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.chats
            .push(Ok(ChatReply { response: response.to_string(), agent: None }), Some(gate.clone()));
        gate
    }

    pub fn push_upload(&self, message: &str) {
        self.uploads.push(
            Ok(UploadReceipt { status: "success".into(), message: message.to_string(), file_name: None }),
            None,
        );
    }

    pub fn push_upload_error(&self, err: ApiError) {
        self.uploads.push(Err(err), None);
    }

    pub fn set_customers(&self, customers: Vec<Customer>) {
        *self.customers.lock().unwrap() = customers;
    }

    pub fn set_letter(&self, bytes: Vec<u8>) {
        *self.letter.lock().unwrap() = Some(bytes);
    }

    pub fn set_admin_rows(&self, rows: AdminRows) {
        *self.admin_rows.lock().unwrap() = Some(rows);
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.state_calls() + self.chat_calls() + self.upload_calls() + self.download_calls()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub async fn wait_for_state_calls(&self, n: usize) {
        wait_until(|| self.state_calls() >= n).await;
    }

    pub async fn wait_for_chat_calls(&self, n: usize) {
        wait_until(|| self.chat_calls() >= n).await;
    }
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn list_customers(&self) -> Result<Vec<Customer>, ApiError> {
        Ok(self.customers.lock().unwrap().clone())
    }

    async fn create_session(&self, customer_id: &str) -> Result<SessionTicket, ApiError> {
        Ok(SessionTicket {
            session_id: "S1".to_string(),
            user_id: customer_id.to_lowercase(),
            initial_state: None,
        })
    }

    async fn get_state(&self, _identity: &SessionIdentity) -> Result<ApplicationState, ApiError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        play(self.states.pop(), || Ok(ApplicationState::default())).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chat_requests.lock().unwrap().push(request.clone());
        play(self.chats.pop(), || Err(Self::server_error())).await
    }

    async fn upload_document(
        &self,
        _identity: &SessionIdentity,
        _document: &DocumentUpload,
    ) -> Result<UploadReceipt, ApiError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        play(self.uploads.pop(), || Err(Self::server_error())).await
    }

    async fn download_sanction_letter(&self, _identity: &SessionIdentity) -> Result<Vec<u8>, ApiError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.letter.lock().unwrap().clone().ok_or_else(Self::server_error)
    }

    async fn admin_table(&self, _admin: &AdminSession, _table: AdminTable) -> Result<AdminRows, ApiError> {
        self.admin_rows.lock().unwrap().clone().ok_or_else(Self::server_error)
    }
}

pub fn identity() -> SessionIdentity {
    SessionIdentity::new(Some("S1"), Some("c1001")).unwrap()
}

pub fn state_named(name: &str) -> ApplicationState {
    ApplicationState { customer_name: name.to_string(), ..Default::default() }
}
