/// Ratatui-based TUI for loandesk.
///
/// Architecture:
///   main thread:  event loop over crossterm keyboard events + mpsc UiEvent drain
///   spawned tasks: backend calls, chat turns, refreshes. Each reports back
///                  through an UnboundedSender<UiEvent>; the loop never awaits
///                  the network itself.
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  tab bar (1 line)                              │
///   ├────────────────────────────────────────────────┤
///   │  tab content (Min(0))                          │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  input box (3 lines, fixed)                    │
///   └────────────────────────────────────────────────┘
pub mod render;
pub mod chat;
pub mod customers_view;
pub mod admin_view;
pub mod persona_view;
pub mod overlays;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::admin::{AdminGate, AdminRows, AdminSession, AdminTable};
use crate::client::{Backend, Customer, SessionTicket};
use crate::config::ResolvedConfig;
use crate::dispatcher::{TurnOutcome, TurnRejected};
use crate::mirror::RefreshOutcome;
use crate::persona::{PersonaConfig, PersonaController, PersonaTokenClient, TranscriptAvatar};
use crate::session::{ChatView, SessionSettings};

// ── UiEvent: results of spawned work, delivered to the event loop ────────────

#[derive(Debug)]
pub enum UiEvent {
    CustomersLoaded(Result<Vec<Customer>, String>),
    SessionStarted { customer: Customer, result: Result<SessionTicket, String> },
    TurnFinished(Result<TurnOutcome, TurnRejected>),
    RefreshFinished(Result<RefreshOutcome, String>),
    Downloaded(Option<PathBuf>),
    AdminLoaded { table: AdminTable, result: Result<AdminRows, String> },
    PersonaFinished { action: &'static str, result: Result<(), String> },
    /// A watched store changed; redraw only.
    Changed,
}

// ── Mode ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    AdminLogin,  // credentials overlay on the Admin tab
}

// ── Tab ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Customers,
    Chat,
    Admin,
    Persona,
}

// ── Login form ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// 0 = username, 1 = password
    pub field: usize,
    pub error: Option<String>,
}

impl LoginForm {
    fn active_field(&mut self) -> &mut String {
        if self.field == 0 { &mut self.username } else { &mut self.password }
    }
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub active_tab: Tab,
    pub mode: Mode,
    pub profile: String,
    pub endpoint: String,
    pub spinner_tick: u32,
    /// One-line notice under the content area
    pub status_msg: Option<String>,

    backend: Arc<dyn Backend>,
    settings: SessionSettings,
    download_dir: PathBuf,

    // Customers tab
    pub customers: Vec<Customer>,
    pub customer_selected: usize,
    pub customers_loading: bool,
    pub customers_error: Option<String>,
    pub starting_session: bool,

    // Chat tab
    pub chat: ChatView,
    pub chat_customer: Option<Customer>,
    pub input: String,
    pub cursor: usize,
    pub scroll: usize,

    // Admin tab
    admin_gate: AdminGate,
    pub admin: Option<Arc<AdminSession>>,
    pub admin_table: AdminTable,
    pub admin_rows: Option<AdminRows>,
    pub admin_loading: bool,
    pub admin_error: Option<String>,
    pub login: LoginForm,

    // Persona tab
    persona_config: PersonaConfig,
    request_timeout: std::time::Duration,
    pub persona: Option<Arc<PersonaController>>,
    pub persona_avatar: Option<Arc<TranscriptAvatar>>,
    pub persona_error: Option<String>,
}

impl AppState {
    pub fn new(resolved: &ResolvedConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            active_tab: Tab::Customers,
            mode: Mode::Normal,
            profile: resolved.profile_name.clone(),
            endpoint: resolved.endpoint.clone(),
            spinner_tick: 0,
            status_msg: None,
            backend,
            settings: resolved.session_settings(),
            download_dir: resolved.download_dir.clone(),
            customers: Vec::new(),
            customer_selected: 0,
            customers_loading: false,
            customers_error: None,
            starting_session: false,
            chat: ChatView::Uninitialized,
            chat_customer: None,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            admin_gate: resolved.admin_gate(),
            admin: None,
            admin_table: AdminTable::Customers,
            admin_rows: None,
            admin_loading: false,
            admin_error: None,
            login: LoginForm::default(),
            persona_config: resolved.persona.clone(),
            request_timeout: resolved.request_timeout,
            persona: None,
            persona_avatar: None,
            persona_error: None,
        }
    }

    /// Anything outstanding that deserves a spinner.
    pub fn is_busy(&self) -> bool {
        self.customers_loading
            || self.starting_session
            || self.admin_loading
            || self.chat.session().is_some_and(|s| s.dispatcher().is_busy())
    }

    pub fn persona_name(&self) -> &str {
        &self.persona_config.name
    }

    fn leave_chat(&mut self) {
        if let Some(session) = self.chat.session_mut() {
            session.close();
        }
        self.chat = ChatView::Uninitialized;
        self.chat_customer = None;
        self.scroll = 0;
    }

    pub fn apply_event(&mut self, ev: UiEvent, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        match ev {
            UiEvent::CustomersLoaded(result) => {
                self.customers_loading = false;
                match result {
                    Ok(list) => {
                        self.customer_selected = self.customer_selected.min(list.len().saturating_sub(1));
                        self.customers = list;
                        self.customers_error = None;
                    }
                    Err(e) => {
                        warn!(component = "tui", event = "customers.failed", error = %e);
                        self.customers_error = Some("Failed to load customers. Please try again.".to_string());
                    }
                }
            }
            UiEvent::SessionStarted { customer, result } => {
                self.starting_session = false;
                match result {
                    Ok(ticket) => self.mount_chat(customer, ticket, ui_tx),
                    Err(e) => {
                        warn!(component = "tui", event = "session.start_failed", customer_id = %customer.id, error = %e);
                        self.customers_error = Some("Failed to start session. Please try again.".to_string());
                    }
                }
            }
            UiEvent::TurnFinished(Err(rejected)) => {
                self.status_msg = Some(rejected.to_string());
            }
            UiEvent::TurnFinished(Ok(_)) => {
                self.scroll = 0;
            }
            UiEvent::RefreshFinished(result) => {
                self.status_msg = Some(match result {
                    Ok(RefreshOutcome::Applied) => "✓ state refreshed".to_string(),
                    Ok(RefreshOutcome::Stale) => "state already up to date".to_string(),
                    Ok(RefreshOutcome::Detached) => return,
                    Err(e) => format!("✗ refresh failed: {e}"),
                });
            }
            UiEvent::Downloaded(path) => {
                if let Some(path) = path {
                    self.status_msg = Some(format!("✓ saved {}", path.display()));
                }
            }
            UiEvent::AdminLoaded { table, result } => {
                if table != self.admin_table {
                    return;
                }
                self.admin_loading = false;
                match result {
                    Ok(rows) => {
                        self.admin_rows = Some(rows);
                        self.admin_error = None;
                    }
                    Err(e) => {
                        self.admin_rows = Some(AdminRows::empty(table));
                        self.admin_error = Some(format!("Error fetching {}: {e}", table.label()));
                    }
                }
            }
            UiEvent::PersonaFinished { action, result } => {
                self.persona_error = result.err().map(|e| format!("{action} failed: {e}"));
            }
            UiEvent::Changed => {}
        }
    }

    fn mount_chat(&mut self, customer: Customer, ticket: SessionTicket, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        self.leave_chat();
        let mut view = ChatView::mount(
            self.backend.clone(),
            Some(&ticket.session_id),
            Some(&ticket.user_id),
            self.settings.clone(),
        );
        if let Some(session) = view.session_mut() {
            forward_changes(session.transcript().subscribe(), ui_tx.clone());
            forward_changes(session.mirror().subscribe(), ui_tx.clone());
            forward_changes(session.dispatcher().subscribe_busy(), ui_tx.clone());
            session.activate();
            info!(component = "tui", event = "chat.mounted", customer_id = %customer.id);
        }
        self.chat = view;
        self.chat_customer = Some(customer);
        self.active_tab = Tab::Chat;
        self.input.clear();
        self.cursor = 0;
    }
}

/// Turn every change of a watched value into a redraw.
fn forward_changes<T: Send + Sync + 'static>(mut rx: watch::Receiver<T>, tx: mpsc::UnboundedSender<UiEvent>) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if tx.send(UiEvent::Changed).is_err() {
                break;
            }
        }
    });
}

// ── Palette commands ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PaletteCommand {
    pub key: &'static str,
    pub label: &'static str,
}

pub fn palette_commands() -> Vec<PaletteCommand> {
    vec![
        PaletteCommand { key: "/upload",   label: "Upload a document  (/upload <path>)" },
        PaletteCommand { key: "/download", label: "Save the sanction letter PDF" },
        PaletteCommand { key: "/refresh",  label: "Refresh application state now" },
        PaletteCommand { key: "/leave",    label: "Close this chat and return to customers" },
        PaletteCommand { key: "/help",     label: "Show help" },
        PaletteCommand { key: "/quit",     label: "Quit" },
    ]
}

/// Returns palette commands whose key starts with the current input.
pub fn slash_filtered(input: &str) -> Vec<PaletteCommand> {
    let q = input.split_whitespace().next().unwrap_or("").to_lowercase();
    palette_commands()
        .into_iter()
        .filter(|c| c.key.starts_with(q.as_str()))
        .collect()
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(resolved: ResolvedConfig, backend: Arc<dyn Backend>) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Restore the terminal before the panic message prints
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, resolved, backend).await;

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    resolved: ResolvedConfig,
    backend: Arc<dyn Backend>,
) -> Result<()> {
    let mut state = AppState::new(&resolved, backend);

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    load_customers(&mut state, &ui_tx);
    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Animation tick ────────────────────────────────────────────────
            _ = ticker.tick() => {
                if state.is_busy() {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Drain results of spawned work ─────────────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev, &ui_tx);
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                if let Event::Key(key) = ev {
                    if key.kind == KeyEventKind::Press && !handle_key(key, &mut state, &ui_tx) {
                        break;
                    }
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    state.leave_chat();
    if let Some(persona) = state.persona.take() {
        let _ = persona.stop().await;
    }
    Ok(())
}

// ── Spawned work ──────────────────────────────────────────────────────────────

fn load_customers(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    state.customers_loading = true;
    state.customers_error = None;
    let backend = state.backend.clone();
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = backend.list_customers().await.map_err(|e| e.to_string());
        let _ = tx.send(UiEvent::CustomersLoaded(result));
    });
}

fn start_session(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    if state.starting_session {
        return;
    }
    let Some(customer) = state.customers.get(state.customer_selected).cloned() else {
        return;
    };
    state.starting_session = true;
    state.customers_error = None;
    let backend = state.backend.clone();
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = backend.create_session(&customer.id).await.map_err(|e| e.to_string());
        let _ = tx.send(UiEvent::SessionStarted { customer, result });
    });
}

fn load_admin_table(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    let Some(session) = state.admin.clone() else { return };
    state.admin_loading = true;
    state.admin_error = None;
    let table = state.admin_table;
    let backend = state.backend.clone();
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = backend.admin_table(&session, table).await.map_err(|e| e.to_string());
        let _ = tx.send(UiEvent::AdminLoaded { table, result });
    });
}

fn ensure_persona(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> Option<Arc<PersonaController>> {
    if let Some(p) = &state.persona {
        return Some(p.clone());
    }
    let tokens = match PersonaTokenClient::new(state.persona_config.clone(), state.request_timeout) {
        Ok(t) => t,
        Err(e) => {
            state.persona_error = Some(format!("persona unavailable: {e}"));
            return None;
        }
    };
    let avatar = Arc::new(TranscriptAvatar::new(state.persona_config.name.clone()));
    let controller = Arc::new(PersonaController::new(
        Arc::new(tokens),
        avatar.clone(),
        state.persona_config.name.clone(),
    ));
    forward_changes(controller.subscribe(), ui_tx.clone());
    state.persona_avatar = Some(avatar);
    state.persona = Some(controller.clone());
    Some(controller)
}

fn persona_action(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>, action: &'static str) {
    let Some(persona) = ensure_persona(state, ui_tx) else { return };
    state.persona_error = None;
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = match action {
            "start" => persona.start().await,
            "stop" => persona.stop().await,
            _ => persona.toggle_mute().await.map(|_| ()),
        };
        let _ = tx.send(UiEvent::PersonaFinished { action, result: result.map_err(|e| e.to_string()) });
    });
}

// ── Key handler ───────────────────────────────────────────────────────────────

/// Returns false when the app should exit.
fn handle_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    if key.modifiers == KeyModifiers::CONTROL && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        return false;
    }

    if state.mode == Mode::AdminLogin {
        handle_login_key(key, state, ui_tx);
        return true;
    }

    // 1-4 switch tabs (only when input is empty)
    if state.input.is_empty() && key.modifiers == KeyModifiers::NONE {
        let tab = match key.code {
            KeyCode::Char('1') => Some(Tab::Customers),
            KeyCode::Char('2') => Some(Tab::Chat),
            KeyCode::Char('3') => Some(Tab::Admin),
            KeyCode::Char('4') => Some(Tab::Persona),
            _ => None,
        };
        if let Some(tab) = tab {
            state.active_tab = tab;
            state.status_msg = None;
            if tab == Tab::Admin && state.admin.is_none() {
                state.mode = Mode::AdminLogin;
                state.login = LoginForm::default();
            }
            return true;
        }
    }

    match state.active_tab {
        Tab::Customers => handle_customers_key(key, state, ui_tx),
        Tab::Chat => return handle_chat_key(key, state, ui_tx),
        Tab::Admin => handle_admin_key(key, state, ui_tx),
        Tab::Persona => handle_persona_key(key, state, ui_tx),
    }
    true
}

fn handle_customers_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => {
            state.customer_selected = state.customer_selected.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if state.customer_selected + 1 < state.customers.len() {
                state.customer_selected += 1;
            }
        }
        KeyCode::Enter => start_session(state, ui_tx),
        KeyCode::Char('r') => load_customers(state, ui_tx),
        _ => {}
    }
}

fn handle_admin_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    if state.admin.is_none() {
        if key.code == KeyCode::Enter {
            state.mode = Mode::AdminLogin;
            state.login = LoginForm::default();
        }
        return;
    }
    match key.code {
        KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => {
            state.admin_table = state.admin_table.next();
            load_admin_table(state, ui_tx);
        }
        KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => {
            state.admin_table = state.admin_table.prev();
            load_admin_table(state, ui_tx);
        }
        KeyCode::Char('r') => load_admin_table(state, ui_tx),
        KeyCode::Char('o') => {
            if let Some(session) = state.admin.take().and_then(|s| Arc::try_unwrap(s).ok()) {
                session.logout();
            }
            state.admin_rows = None;
            state.admin_error = None;
            state.login = LoginForm::default();
            state.active_tab = Tab::Customers;
        }
        _ => {}
    }
}

fn handle_login_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    match key.code {
        KeyCode::Esc => {
            state.mode = Mode::Normal;
            state.login = LoginForm::default();
            state.active_tab = Tab::Customers;
        }
        KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
            state.login.field = 1 - state.login.field;
        }
        KeyCode::Backspace => {
            state.login.active_field().pop();
        }
        KeyCode::Char(c) => state.login.active_field().push(c),
        KeyCode::Enter => {
            if state.login.field == 0 {
                state.login.field = 1;
                return;
            }
            match state.admin_gate.login(&state.login.username, &state.login.password) {
                Ok(session) => {
                    state.admin = Some(Arc::new(session));
                    state.mode = Mode::Normal;
                    state.login.error = None;
                    state.admin_table = AdminTable::Customers;
                    load_admin_table(state, ui_tx);
                }
                Err(_) => {
                    state.login.error = Some(state.admin_gate.hint());
                    state.login.password.clear();
                }
            }
        }
        _ => {}
    }
}

fn handle_persona_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    match key.code {
        KeyCode::Char('s') | KeyCode::Enter => persona_action(state, ui_tx, "start"),
        KeyCode::Char('x') => persona_action(state, ui_tx, "stop"),
        KeyCode::Char('m') => persona_action(state, ui_tx, "mute"),
        _ => {}
    }
}

fn handle_chat_key(key: KeyEvent, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    match (key.modifiers, key.code) {
        (_, KeyCode::Enter) => return submit_input(state, ui_tx),
        (_, KeyCode::PageUp) => state.scroll = state.scroll.saturating_add(5),
        (_, KeyCode::PageDown) => state.scroll = state.scroll.saturating_sub(5),
        (KeyModifiers::NONE, KeyCode::Char('d'))
            if state.input.is_empty()
                && state.chat.session().is_some_and(|s| {
                    s.mirror().snapshot().is_some_and(|snap| snap.sanction_reference().is_some())
                }) =>
        {
            download(state, ui_tx);
        }
        (KeyModifiers::CONTROL, KeyCode::Char('w')) => input_delete_word(&mut state.input, &mut state.cursor),
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
            state.input.clear();
            state.cursor = 0;
        }
        (_, KeyCode::Backspace) => input_backspace(&mut state.input, &mut state.cursor),
        (_, KeyCode::Delete) => input_delete_forward(&mut state.input, &mut state.cursor),
        (_, KeyCode::Left) => state.cursor = prev_char_boundary(&state.input, state.cursor),
        (_, KeyCode::Right) => state.cursor = next_char_boundary(&state.input, state.cursor),
        (_, KeyCode::Home) => state.cursor = 0,
        (_, KeyCode::End) => state.cursor = state.input.len(),
        (_, KeyCode::Esc) => {
            state.input.clear();
            state.cursor = 0;
        }
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
            state.input.insert(state.cursor, c);
            state.cursor += c.len_utf8();
        }
        _ => {}
    }
    true
}

fn submit_input(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    let text = state.input.trim().to_string();
    if text.is_empty() {
        return true;
    }
    if text.starts_with('/') {
        state.input.clear();
        state.cursor = 0;
        return execute_command(&text, state, ui_tx);
    }
    let Some(session) = state.chat.session() else {
        state.status_msg = Some("pick a customer first  ([1] Customers)".to_string());
        return true;
    };
    let dispatcher = session.dispatcher();
    // Keep the draft when a turn is already in flight.
    if dispatcher.is_busy() {
        state.status_msg = Some(TurnRejected::Busy.to_string());
        return true;
    }
    state.input.clear();
    state.cursor = 0;
    state.status_msg = None;
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let result = dispatcher.send_text(&text).await.map(|r| r.outcome);
        let _ = tx.send(UiEvent::TurnFinished(result));
    });
    true
}

fn download(state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
    let Some(session) = state.chat.session() else { return };
    let dispatcher = session.dispatcher();
    let dir = state.download_dir.clone();
    let tx = ui_tx.clone();
    tokio::spawn(async move {
        let path = dispatcher.download_sanction_letter(&dir).await;
        let _ = tx.send(UiEvent::Downloaded(path));
    });
}

// ── Slash command handler ─────────────────────────────────────────────────────

fn execute_command(cmd: &str, state: &mut AppState, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
    let (name, arg) = match cmd.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (cmd, ""),
    };
    match name {
        "/quit" | "/exit" => return false,
        "/help" => {
            state.status_msg = Some(
                palette_commands().iter().map(|c| c.key).collect::<Vec<_>>().join("  "),
            );
        }
        "/leave" => {
            state.leave_chat();
            state.active_tab = Tab::Customers;
        }
        "/upload" | "/download" | "/refresh" if state.chat.session().is_none() => {
            state.status_msg = Some("no active chat".to_string());
        }
        "/upload" => {
            if arg.is_empty() {
                state.status_msg = Some("usage: /upload <path>".to_string());
                return true;
            }
            let Some(session) = state.chat.session() else { return true };
            let dispatcher = session.dispatcher();
            let path = PathBuf::from(expand_tilde(arg));
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = dispatcher.upload(&path).await.map(|r| r.outcome);
                let _ = tx.send(UiEvent::TurnFinished(result));
            });
        }
        "/download" => download(state, ui_tx),
        "/refresh" => {
            let Some(session) = state.chat.session() else { return true };
            let mirror = session.mirror().clone();
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = mirror.refresh().await.map_err(|e| e.to_string());
                let _ = tx.send(UiEvent::RefreshFinished(result));
            });
        }
        other => {
            let hint = slash_filtered(other).first().map(|c| format!("  (did you mean {}?)", c.key));
            state.status_msg = Some(format!("unknown command {other}{}", hint.unwrap_or_default()));
        }
    }
    true
}

// ── Small helpers ─────────────────────────────────────────────────────────────

fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        path.replacen("~", &home, 1)
    } else {
        path.to_string()
    }
}

// ── Input editing helpers ─────────────────────────────────────────────────────

/// Remove the character immediately before the cursor (UTF-8 safe).
fn input_backspace(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let prev = prev_char_boundary(input, *cursor);
    input.drain(prev..*cursor);
    *cursor = prev;
}

/// Delete the character at the cursor position.
fn input_delete_forward(input: &mut String, cursor: &mut usize) {
    if *cursor >= input.len() {
        return;
    }
    let next = next_char_boundary(input, *cursor);
    input.drain(*cursor..next);
}

/// Delete the word immediately before the cursor (stops at whitespace boundary).
fn input_delete_word(input: &mut String, cursor: &mut usize) {
    if *cursor == 0 {
        return;
    }
    let bytes = input.as_bytes();
    let mut start = *cursor;
    while start > 0 && bytes[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    while start > 0 && !bytes[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    input.drain(start..*cursor);
    *cursor = start;
}

/// Previous UTF-8 char boundary before `pos`.
fn prev_char_boundary(s: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let mut p = pos - 1;
    while !s.is_char_boundary(p) {
        p -= 1;
    }
    p
}

/// Next UTF-8 char boundary after `pos`.
fn next_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut p = pos + 1;
    while p <= s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    p.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, Overrides};
    use crate::testing::ScriptedBackend;

    fn app() -> (AppState, Arc<ScriptedBackend>, mpsc::UnboundedSender<UiEvent>, mpsc::UnboundedReceiver<UiEvent>) {
        let backend = ScriptedBackend::new();
        let resolved = ResolvedConfig::resolve(&ConfigFile::default(), &Overrides::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (AppState::new(&resolved, backend.clone()), backend, tx, rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.into(),
            name: "Rajesh Kumar".into(),
            city: "Mumbai".into(),
            monthly_salary: 85000,
            credit_score: 780,
            pre_approved_limit: 500000,
        }
    }

    #[test]
    fn test_input_editing_is_utf8_safe() {
        let mut s = "héllo wörld".to_string();
        let mut cursor = s.len();
        input_backspace(&mut s, &mut cursor);
        assert_eq!(s, "héllo wörl");
        input_delete_word(&mut s, &mut cursor);
        assert_eq!(s, "héllo ");
        cursor = prev_char_boundary(&s, 3);
        assert_eq!(cursor, 1);
    }

    #[test]
    fn test_slash_filter_matches_prefix() {
        let keys: Vec<&str> = slash_filtered("/d").iter().map(|c| c.key).collect();
        assert_eq!(keys, ["/download"]);
        assert_eq!(slash_filtered("/upload ~/a.pdf")[0].key, "/upload");
    }

    #[tokio::test]
    async fn test_selecting_customer_mounts_chat() {
        let (mut state, backend, tx, mut rx) = app();
        backend.set_customers(vec![customer("C1001")]);

        load_customers(&mut state, &tx);
        let ev = rx.recv().await.unwrap();
        state.apply_event(ev, &tx);
        assert_eq!(state.customers.len(), 1);

        assert!(handle_key(key(KeyCode::Enter), &mut state, &tx));
        let ev = rx.recv().await.unwrap();
        assert!(matches!(ev, UiEvent::SessionStarted { .. }));
        state.apply_event(ev, &tx);

        assert_eq!(state.active_tab, Tab::Chat);
        let session = state.chat.session().unwrap();
        assert_eq!(session.identity().session_id(), "S1");
        assert_eq!(session.identity().user_id(), "c1001");

        assert!(execute_command("/leave", &mut state, &tx));
        assert!(state.chat.session().is_none());
        assert_eq!(state.active_tab, Tab::Customers);
    }

    #[tokio::test]
    async fn test_admin_login_flow() {
        let (mut state, backend, tx, mut rx) = app();
        backend.set_admin_rows(AdminRows::empty(AdminTable::Customers));

        // Entering the Admin tab without a session opens the login overlay.
        handle_key(key(KeyCode::Char('3')), &mut state, &tx);
        assert_eq!(state.mode, Mode::AdminLogin);

        for c in "admin".chars() {
            handle_key(key(KeyCode::Char(c)), &mut state, &tx);
        }
        handle_key(key(KeyCode::Enter), &mut state, &tx);
        for c in "nope".chars() {
            handle_key(key(KeyCode::Char(c)), &mut state, &tx);
        }
        handle_key(key(KeyCode::Enter), &mut state, &tx);
        assert_eq!(state.login.error.as_deref(), Some("Invalid credentials. Use admin/admin123"));
        assert!(state.admin.is_none());

        for c in "admin123".chars() {
            handle_key(key(KeyCode::Char(c)), &mut state, &tx);
        }
        handle_key(key(KeyCode::Enter), &mut state, &tx);
        assert!(state.admin.is_some());
        assert_eq!(state.mode, Mode::Normal);
        assert!(state.admin_loading);

        let ev = rx.recv().await.unwrap();
        state.apply_event(ev, &tx);
        assert!(!state.admin_loading);
        assert_eq!(state.admin_rows, Some(AdminRows::empty(AdminTable::Customers)));

        handle_key(key(KeyCode::Char('o')), &mut state, &tx);
        assert!(state.admin.is_none());
    }

    #[test]
    fn test_unknown_command_suggests() {
        let (mut state, _backend, tx, _rx) = app();
        execute_command("/refres", &mut state, &tx);
        assert!(state.status_msg.unwrap().contains("/refresh"));
    }
}
