mod admin;
mod client;
mod config;
mod dispatcher;
mod error;
mod logging;
mod mirror;
mod persona;
mod poller;
mod session;
mod state;
mod transcript;
mod tui;
mod ui;
mod upload;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::warn;
use config::{ConfigFile, Overrides, ResolvedConfig};

#[derive(Parser, Debug)]
#[command(
    name = "loandesk",
    about = "A terminal front-end for the personal loan assistant",
    long_about = None,
)]
struct Args {
    /// Plain stdout mode (omit to enter the interactive TUI)
    #[command(subcommand)]
    command: Option<Command>,

    /// Profile to use from config file
    #[arg(short, long, env = "LOANDESK_PROFILE", global = true)]
    profile: Option<String>,

    /// Override backend URL
    #[arg(long, env = "LOANDESK_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Language code sent with every chat message (e.g. hi-IN)
    #[arg(short, long, global = true)]
    language: Option<String>,

    /// API key for the persona token service
    #[arg(long, env = "LOANDESK_PERSONA_API_KEY", hide_env_values = true)]
    persona_api_key: Option<String>,

    /// Write a default config file to ~/.config/loandesk/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List available profiles and exit
    #[arg(long)]
    profiles: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the customer list
    Customers,
    /// Start a session for a customer, send one message, print the transcript
    Chat {
        customer_id: String,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: loandesk");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;

    // ── --profiles ────────────────────────────────────────────────────────────
    if args.profiles {
        print_profiles(&file);
        return Ok(());
    }

    let resolved = ResolvedConfig::resolve(
        &file,
        &Overrides {
            profile: args.profile.as_deref(),
            endpoint: args.endpoint.as_deref(),
            language: args.language.as_deref(),
            persona_api_key: args.persona_api_key.as_deref(),
        },
    );

    let logging = logging::init_logging()?;
    tracing::info!(
        component = "main",
        event = "startup",
        run_id = %logging.run_id,
        profile = %resolved.profile_name,
        endpoint = %resolved.endpoint,
    );

    let backend: Arc<dyn client::Backend> = Arc::new(
        client::HttpBackend::new(resolved.endpoint.clone(), resolved.request_timeout)
            .context("failed to build HTTP client")?,
    );

    // ── Plain mode (non-TUI) ──────────────────────────────────────────────────
    match args.command {
        Some(Command::Customers) => return run_customers(backend.as_ref()).await,
        Some(Command::Chat { customer_id, message }) => {
            return run_single_turn(backend, &resolved, &customer_id, &message).await;
        }
        None => {}
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    let result = tui::run(resolved, backend).await;
    if let Err(e) = &result {
        tracing::error!(component = "main", event = "tui.failed", error = %e);
        eprintln!("  log: {}", logging.log_path.display());
    }
    result
}

// ── Plain mode (stdout, no TUI) ───────────────────────────────────────────────

async fn run_customers(backend: &dyn client::Backend) -> Result<()> {
    let customers = backend.list_customers().await.context("Failed to load customers")?;
    println!();
    println!("  Customers");
    for c in &customers {
        let band = ui::band_label(state::ScoreBand::from_score(c.credit_score));
        println!(
            "  {:<7} {:<22} {:<12} {:>12}/mo  {} ({band})  limit {}",
            c.id,
            ui::truncate(&c.name, 22),
            c.city,
            ui::fmt_inr(c.monthly_salary as f64),
            c.credit_score,
            ui::fmt_inr(c.pre_approved_limit as f64),
        );
    }
    println!();
    Ok(())
}

async fn run_single_turn(
    backend: Arc<dyn client::Backend>,
    resolved: &ResolvedConfig,
    customer_id: &str,
    message: &str,
) -> Result<()> {
    let ticket = backend
        .create_session(customer_id)
        .await
        .context("Failed to start session")?;

    println!();
    println!("  ▲ loandesk  {}  ·  {}  ·  session {}", resolved.profile_name, ticket.user_id, ticket.session_id);
    println!();

    let mut view = session::ChatView::mount(
        backend,
        Some(&ticket.session_id),
        Some(&ticket.user_id),
        resolved.session_settings(),
    );
    let Some(chat) = view.session_mut() else {
        anyhow::bail!("backend returned an unusable session");
    };

    // Only an answered turn refreshes; a failed one leaves the server state alone.
    let report = chat.dispatcher().send_text(message).await?;
    if let Some(refresh) = report.refresh {
        match refresh.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(component = "plain", event = "refresh.failed", error = %e),
            Err(e) => warn!(component = "plain", event = "refresh.panicked", error = %e),
        }
    }

    for entry in chat.transcript().all() {
        let who = match (entry.role, entry.agent.as_deref()) {
            (transcript::Role::User, _) => "you".to_string(),
            (transcript::Role::Assistant, Some(agent)) if !agent.is_empty() => format!("assistant · {agent}"),
            (transcript::Role::Assistant, _) => "assistant".to_string(),
            (transcript::Role::System, _) => "notice".to_string(),
        };
        println!("  {} {who}", ui::role_glyph(entry.role));
        for line in entry.content.lines() {
            println!("    {line}");
        }
        println!();
    }

    let snapshot = chat
        .mirror()
        .snapshot()
        .or_else(|| ticket.initial_state.clone().map(Arc::new));
    if let Some(snap) = snapshot {
        println!("  Status  {}", snap.application_status.as_str());
        for step in snap.progress() {
            let detail = step.detail.map(|d| format!("  {d}")).unwrap_or_default();
            println!("    {} {}{detail}", ui::step_glyph(step.status), step.label);
        }
        if let Some(reference) = snap.sanction_reference() {
            println!("    sanction ref {reference}");
        }
        println!();
    }

    chat.close();
    Ok(())
}

// ── Profiles listing (non-TUI) ────────────────────────────────────────────────

fn print_profiles(file: &ConfigFile) {
    let mut entries: Vec<(&String, &config::Profile)> = file.profiles.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    println!();
    println!("  Profiles");
    for (name, p) in &entries {
        let marker = if **name == file.default_profile { " ←" } else { "" };
        println!("  {name}{marker}");
        println!("    endpoint  {}", p.endpoint);
        println!("    poll      {}s", p.poll_interval_secs);
        println!("    language  {}", p.language.as_deref().unwrap_or("-"));
        println!();
    }
    if entries.is_empty() {
        println!("  (none, built-in defaults in use; run --init to create a config)");
        println!();
    }
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => {
            eprintln!("Unknown shell: {shell_name}");
            eprintln!("Supported: bash, zsh, fish, elvish");
            std::process::exit(1);
        }
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "loandesk", &mut std::io::stdout());
    Ok(())
}
