/// Video-persona capability.
///
/// The avatar SDK is consumed only through [`AvatarClient`]. The controller
/// fetches a session token, drives the client through its lifecycle and folds
/// the client's events into a status line for the persona tab.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PersonaError;

pub const DEFAULT_PERSONA_NAME: &str = "Priya";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
pub const DEFAULT_MAX_SESSION_SECS: u32 = 1800;

// ── Capability ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarEvent {
    ConnectionEstablished,
    SpeakingStarted,
    SpeakingEnded,
    ConnectionClosed,
    Error(String),
}

/// Everything the front-end needs from a video-avatar SDK.
#[async_trait]
pub trait AvatarClient: Send + Sync {
    /// Open a session with a token from [`TokenSource`].
    async fn connect(&self, session_token: &str) -> Result<(), PersonaError>;
    /// Bind the avatar's output to a named surface.
    async fn attach(&self, surface: &str) -> Result<(), PersonaError>;
    async fn start(&self) -> Result<(), PersonaError>;
    async fn stop(&self) -> Result<(), PersonaError>;
    async fn set_muted(&self, muted: bool) -> Result<(), PersonaError>;
    fn subscribe(&self) -> broadcast::Receiver<AvatarEvent>;
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn session_token(&self) -> Result<String, PersonaError>;
}

// ── Token client ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub token_url: Option<String>,
    pub api_key: Option<String>,
    pub name: String,
    pub system_prompt: String,
    pub max_session_secs: u32,
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
    pub llm_id: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            api_key: None,
            name: DEFAULT_PERSONA_NAME.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_session_secs: DEFAULT_MAX_SESSION_SECS,
            avatar_id: None,
            voice_id: None,
            llm_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonaSpec<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm_id: Option<&'a str>,
    system_prompt: &'a str,
    max_session_length_seconds: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    persona_config: PersonaSpec<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    session_token: String,
}

impl PersonaConfig {
    fn token_request(&self) -> TokenRequest<'_> {
        TokenRequest {
            persona_config: PersonaSpec {
                name: &self.name,
                avatar_id: self.avatar_id.as_deref(),
                voice_id: self.voice_id.as_deref(),
                llm_id: self.llm_id.as_deref(),
                system_prompt: &self.system_prompt,
                max_session_length_seconds: self.max_session_secs,
            },
        }
    }
}

/// Requests persona session tokens over HTTP with a bearer API key.
pub struct PersonaTokenClient {
    http: reqwest::Client,
    config: PersonaConfig,
}

impl PersonaTokenClient {
    pub fn new(config: PersonaConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl TokenSource for PersonaTokenClient {
    async fn session_token(&self) -> Result<String, PersonaError> {
        let url = self
            .config
            .token_url
            .as_deref()
            .ok_or_else(|| PersonaError::NotConfigured("token_url is not set".into()))?;
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| PersonaError::NotConfigured("API key is not set".into()))?;

        debug!(component = "persona", event = "token.request", url);
        let resp = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&self.config.token_request())
            .send()
            .await
            .map_err(|e| PersonaError::Token(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PersonaError::Token(format!("HTTP {status}: {body}")));
        }
        let body: TokenResponse = resp.json().await.map_err(|e| PersonaError::Token(e.to_string()))?;
        Ok(body.session_token)
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaStatus {
    pub text: String,
    pub connecting: bool,
    pub connected: bool,
    pub muted: bool,
    pub error: Option<String>,
}

impl Default for PersonaStatus {
    fn default() -> Self {
        Self {
            text: "Initializing...".to_string(),
            connecting: false,
            connected: false,
            muted: false,
            error: None,
        }
    }
}

impl PersonaStatus {
    /// Fold one client event into the status line.
    pub fn apply(&mut self, event: &AvatarEvent, persona: &str) {
        match event {
            AvatarEvent::ConnectionEstablished => {
                self.text = "Connected! Start speaking...".to_string();
                self.connected = true;
                self.connecting = false;
            }
            AvatarEvent::SpeakingStarted => self.text = format!("{persona} is speaking..."),
            AvatarEvent::SpeakingEnded => self.text = "Listening...".to_string(),
            AvatarEvent::ConnectionClosed => {
                self.text = "Connection closed".to_string();
                self.connected = false;
            }
            AvatarEvent::Error(message) => {
                self.error = Some(message.clone());
                self.connecting = false;
            }
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct PersonaController {
    tokens: Arc<dyn TokenSource>,
    client: Arc<dyn AvatarClient>,
    name: String,
    status: watch::Sender<PersonaStatus>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl PersonaController {
    pub fn new(tokens: Arc<dyn TokenSource>, client: Arc<dyn AvatarClient>, name: impl Into<String>) -> Self {
        let (status, _rx) = watch::channel(PersonaStatus::default());
        Self { tokens, client, name: name.into(), status, pump: Mutex::new(None) }
    }

    pub fn status(&self) -> PersonaStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PersonaStatus> {
        self.status.subscribe()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, f: impl FnOnce(&mut PersonaStatus)) {
        self.status.send_modify(f);
    }

    /// Token, connect, attach, start. Any failure leaves the status at
    /// "Failed to connect" with the error recorded.
    pub async fn start(&self) -> Result<(), PersonaError> {
        self.set(|s| {
            *s = PersonaStatus { text: "Creating session...".into(), connecting: true, ..Default::default() };
        });
        let result = self.connect_and_start().await;
        if let Err(err) = &result {
            warn!(component = "persona", event = "persona.start_failed", error = %err);
            self.set(|s| {
                s.text = "Failed to connect".into();
                s.connecting = false;
                s.error = Some(err.to_string());
            });
        }
        result
    }

    async fn connect_and_start(&self) -> Result<(), PersonaError> {
        let token = self.tokens.session_token().await?;
        self.set(|s| s.text = "Connecting to persona...".into());

        let mut events = self.client.subscribe();
        let status = self.status.clone();
        let name = self.name.clone();
        let pump = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => status.send_modify(|s| s.apply(&event, &name)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(component = "persona", event = "events.lagged", skipped = n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(old) = self.pump_slot().replace(pump) {
            old.abort();
        }

        self.client.connect(&token).await?;
        self.client.attach("terminal").await?;
        self.client.start().await?;
        info!(component = "persona", event = "persona.started", name = %self.name);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), PersonaError> {
        let result = self.client.stop().await;
        if let Some(pump) = self.pump_slot().take() {
            pump.abort();
        }
        self.set(|s| {
            s.text = "Disconnected".into();
            s.connected = false;
            s.connecting = false;
        });
        info!(component = "persona", event = "persona.stopped", name = %self.name);
        result
    }

    pub async fn toggle_mute(&self) -> Result<bool, PersonaError> {
        let muted = !self.status.borrow().muted;
        self.client.set_muted(muted).await?;
        self.set(|s| s.muted = muted);
        Ok(muted)
    }

    fn pump_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PersonaController {
    fn drop(&mut self) {
        if let Some(pump) = self.pump_slot().take() {
            pump.abort();
        }
    }
}

// ── Terminal avatar ───────────────────────────────────────────────────────────

/// An [`AvatarClient`] for a terminal: no video, the persona's speech is kept
/// as lines of text for the persona tab to show.
pub struct TranscriptAvatar {
    name: String,
    events: broadcast::Sender<AvatarEvent>,
    lines: Mutex<Vec<String>>,
    session: Mutex<Option<String>>,
    surface: Mutex<Option<String>>,
}

impl TranscriptAvatar {
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _rx) = broadcast::channel(64);
        Self {
            name: name.into(),
            events,
            lines: Mutex::new(Vec::new()),
            session: Mutex::new(None),
            surface: Mutex::new(None),
        }
    }

    fn emit(&self, event: AvatarEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);
    }

    /// The persona says `text`.
    pub fn speak(&self, text: impl Into<String>) {
        self.emit(AvatarEvent::SpeakingStarted);
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(text.into());
        self.emit(AvatarEvent::SpeakingEnded);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn surface(&self) -> Option<String> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AvatarClient for TranscriptAvatar {
    async fn connect(&self, session_token: &str) -> Result<(), PersonaError> {
        if session_token.is_empty() {
            return Err(PersonaError::Client("empty session token".into()));
        }
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session_token.to_string());
        Ok(())
    }

    async fn attach(&self, surface: &str) -> Result<(), PersonaError> {
        *self.surface.lock().unwrap_or_else(PoisonError::into_inner) = Some(surface.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<(), PersonaError> {
        if self.session.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            return Err(PersonaError::Client("not connected".into()));
        }
        self.emit(AvatarEvent::ConnectionEstablished);
        self.speak(format!("Hi, I'm {}. How can I help you with your loan today?", self.name));
        Ok(())
    }

    async fn stop(&self) -> Result<(), PersonaError> {
        if self.session.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            self.emit(AvatarEvent::ConnectionClosed);
        }
        Ok(())
    }

    async fn set_muted(&self, _muted: bool) -> Result<(), PersonaError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AvatarEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedToken(Result<String, PersonaError>);

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn session_token(&self) -> Result<String, PersonaError> {
            self.0.clone()
        }
    }

    fn controller(token: Result<String, PersonaError>) -> (PersonaController, Arc<TranscriptAvatar>) {
        let avatar = Arc::new(TranscriptAvatar::new("Priya"));
        let ctl = PersonaController::new(Arc::new(FixedToken(token)), avatar.clone(), "Priya");
        (ctl, avatar)
    }

    #[test]
    fn test_status_follows_events() {
        let mut s = PersonaStatus::default();
        s.apply(&AvatarEvent::ConnectionEstablished, "Priya");
        assert_eq!(s.text, "Connected! Start speaking...");
        assert!(s.connected);
        s.apply(&AvatarEvent::SpeakingStarted, "Priya");
        assert_eq!(s.text, "Priya is speaking...");
        s.apply(&AvatarEvent::SpeakingEnded, "Priya");
        assert_eq!(s.text, "Listening...");
        s.apply(&AvatarEvent::ConnectionClosed, "Priya");
        assert_eq!(s.text, "Connection closed");
        assert!(!s.connected);
    }

    #[test]
    fn test_token_request_body_shape() {
        let cfg = PersonaConfig { avatar_id: Some("av-1".into()), ..Default::default() };
        let json = serde_json::to_value(cfg.token_request()).unwrap();
        let spec = &json["personaConfig"];
        assert_eq!(spec["name"], "Priya");
        assert_eq!(spec["avatarId"], "av-1");
        assert!(spec.get("voiceId").is_none());
        assert_eq!(spec["systemPrompt"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(spec["maxSessionLengthSeconds"], 1800);
    }

    #[tokio::test]
    async fn test_unconfigured_token_client_fails_fast() {
        let client = PersonaTokenClient::new(PersonaConfig::default(), Duration::from_secs(1)).unwrap();
        assert!(matches!(client.session_token().await, Err(PersonaError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_start_connects_and_mirrors_events() {
        let (ctl, avatar) = controller(Ok("tok-1".into()));
        let mut rx = ctl.subscribe();
        ctl.start().await.unwrap();

        let status = rx.wait_for(|s| s.text == "Listening...").await.unwrap().clone();
        assert!(status.connected);
        assert_eq!(avatar.surface().as_deref(), Some("terminal"));
        assert_eq!(avatar.lines().len(), 1);

        assert!(ctl.toggle_mute().await.unwrap());
        assert!(ctl.status().muted);

        ctl.stop().await.unwrap();
        assert_eq!(ctl.status().text, "Disconnected");
        assert!(!ctl.status().connected);
    }

    #[tokio::test]
    async fn test_token_failure_reports_failed_to_connect() {
        let (ctl, _avatar) = controller(Err(PersonaError::Token("HTTP 401".into())));
        assert!(ctl.start().await.is_err());
        let status = ctl.status();
        assert_eq!(status.text, "Failed to connect");
        assert!(status.error.unwrap().contains("401"));
        assert!(!status.connecting);
    }
}
