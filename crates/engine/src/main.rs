//! casesim - terminal front-end for the case-study advisor.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casesim_domain::{Message, Role, SessionId, TranscriptEntry, TranscriptView};
use casesim_engine::infrastructure::{config::EngineConfig, ports::ProviderConfig};
use casesim_engine::use_cases::turn::PendingAdvisorMessage;
use casesim_engine::use_cases::{DraftSink, SessionError, TurnError, TurnResult};
use casesim_engine::App;

const HELP: &str = "Commands: /new  /history  /sessions  /configure <base-url> [api-key] [model]  /retry  /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    // Logs go to stderr so they never interleave with streamed advisor text.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casesim_engine=info,casesim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::from_env();
    tracing::info!(db = %config.db_path, user = %config.user, "Starting casesim");

    let app = App::connect(&config)
        .await
        .with_context(|| format!("failed to open storage at {}", config.db_path))?;

    Terminal::new(app).run().await
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides, then the working directory.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    let _ = dotenvy::dotenv();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Advisor => "Advisor",
    }
}

/// Screen lines for a transcript view; a draft renders after the final messages.
fn transcript_lines(view: &TranscriptView) -> Vec<String> {
    view.entries()
        .map(|entry| match entry {
            TranscriptEntry::Final(message) => {
                format!("{}: {}", speaker(message.role), message.content)
            }
            TranscriptEntry::Draft(content) => format!("Advisor (draft): {}", content),
        })
        .collect()
}

/// Renders drafts incrementally and mirrors them into the transcript view.
struct ConsoleDrafts {
    view: Arc<Mutex<TranscriptView>>,
    shown: Mutex<String>,
}

impl ConsoleDrafts {
    fn new(view: Arc<Mutex<TranscriptView>>) -> Self {
        Self {
            view,
            shown: Mutex::new(String::new()),
        }
    }

    /// Print whatever part of the final text is not on screen yet.
    fn finish(&self, final_text: &str) {
        let shown = std::mem::take(&mut *lock(&self.shown));
        if shown.is_empty() {
            print!("Advisor: {}", final_text);
        } else if let Some(rest) = final_text.strip_prefix(shown.as_str()) {
            print!("{}", rest);
        } else {
            print!("\nAdvisor: {}", final_text);
        }
        println!();
    }

    fn abandon(&self) {
        if !std::mem::take(&mut *lock(&self.shown)).is_empty() {
            println!();
        }
        lock(&self.view).clear_draft();
    }
}

impl DraftSink for ConsoleDrafts {
    fn draft(&self, content: &str) {
        lock(&self.view).set_draft(content);

        let mut shown = lock(&self.shown);
        if shown.is_empty() {
            print!("Advisor: {}", content);
        } else if let Some(rest) = content.strip_prefix(shown.as_str()) {
            print!("{}", rest);
        } else {
            // Provider rewrote earlier text; start the line over.
            print!("\nAdvisor: {}", content);
        }
        let _ = std::io::stdout().flush();
        *shown = content.to_string();
    }

    fn clear(&self) {
        lock(&self.view).clear_draft();
    }
}

/// Run `turn`, cancelling it when Ctrl-C arrives first.
async fn interruptible<T>(cancel: &CancellationToken, turn: impl Future<Output = T>) -> T {
    tokio::pin!(turn);
    tokio::select! {
        out = &mut turn => out,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            turn.await
        }
    }
}

struct Terminal {
    app: App,
    session: Option<SessionId>,
    view: Arc<Mutex<TranscriptView>>,
    pending: Option<PendingAdvisorMessage>,
}

impl Terminal {
    fn new(app: App) -> Self {
        Self {
            app,
            session: None,
            view: Arc::new(Mutex::new(TranscriptView::new())),
            pending: None,
        }
    }

    async fn run(mut self) -> anyhow::Result<()> {
        println!("Case Study Simulator");
        println!("{}", HELP);
        self.new_case().await;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();

            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };

            let mut words = line.split_whitespace();
            match words.next() {
                Some("/quit") => break,
                Some("/new") => self.new_case().await,
                Some("/history") => self.history().await,
                Some("/sessions") => self.sessions().await,
                Some("/retry") => self.retry().await,
                Some("/configure") => {
                    let args: Vec<&str> = words.collect();
                    self.configure(&args).await;
                }
                Some(cmd) if cmd.starts_with('/') => println!("{}", HELP),
                _ => self.decide(&line).await,
            }
        }

        tracing::info!("Exiting casesim");
        Ok(())
    }

    async fn new_case(&mut self) {
        // An unsaved advisor message belongs to the current case; store it first.
        if let Err(e) = self.app.sessions.flush_pending(&mut self.pending).await {
            eprintln!(
                "The last advisor message is still not saved ({}). Type /retry before /new.",
                e
            );
            return;
        }
        *lock(&self.view) = TranscriptView::new();

        let drafts = ConsoleDrafts::new(self.view.clone());
        let cancel = CancellationToken::new();
        let started = interruptible(
            &cancel,
            self.app
                .sessions
                .start_case(&self.app.user, &drafts, &cancel),
        )
        .await;

        match started {
            Ok(start) => {
                self.session = Some(start.session.id);
                self.settle(&drafts, start.opening);
            }
            Err(e) => {
                drafts.abandon();
                eprintln!("Could not start a new case: {}", e);
            }
        }
    }

    async fn decide(&mut self, input: &str) {
        let Some(session_id) = self.session else {
            println!("No active case. Type /new to start one.");
            return;
        };
        if self.pending.is_some() {
            println!("The last advisor message is not saved yet. Type /retry first.");
            return;
        }

        let history = lock(&self.view).history();
        let drafts = ConsoleDrafts::new(self.view.clone());
        let cancel = CancellationToken::new();
        let outcome = interruptible(
            &cancel,
            self.app
                .sessions
                .submit_decision(session_id, &history, input, &drafts, &cancel),
        )
        .await;

        let decision = Message::user(input);
        match outcome {
            Ok(result) => {
                lock(&self.view).push(decision);
                self.settle(&drafts, Ok(result));
            }
            Err(SessionError::Turn(e)) => {
                lock(&self.view).push(decision);
                self.settle(&drafts, Err(e));
            }
            Err(e) => {
                drafts.abandon();
                eprintln!("{}", e);
            }
        }
    }

    fn settle(&mut self, drafts: &ConsoleDrafts, outcome: Result<TurnResult, TurnError>) {
        match outcome {
            Ok(result) => {
                drafts.finish(&result.final_message.content);
                if result.used_fallback {
                    println!("(offline advisor; check /configure)");
                }
                lock(&self.view).promote(result.final_message);
            }
            Err(TurnError::Cancelled) => {
                drafts.abandon();
                println!("[turn cancelled]");
            }
            Err(TurnError::PersistenceFailed { pending, source }) => {
                let message = pending.message();
                drafts.finish(&message.content);
                lock(&self.view).promote(message);
                eprintln!("Advisor message was not saved ({}). Type /retry to save it.", source);
                self.pending = Some(pending);
            }
        }
    }

    async fn retry(&mut self) {
        match self.app.sessions.flush_pending(&mut self.pending).await {
            Ok(Some(_)) => println!("Saved."),
            Ok(None) => println!("Nothing to retry."),
            Err(e) => eprintln!("Still not saved ({}).", e),
        }
    }

    /// Reload the stored transcript into the view and print it.
    async fn history(&self) {
        let Some(session_id) = self.session else {
            println!("No active case.");
            return;
        };

        let stored = match self.app.sessions.transcript(session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                eprintln!("Could not load transcript: {}", e);
                return;
            }
        };

        let mut view = lock(&self.view);
        let draft = view.draft().map(str::to_string);
        let mut reloaded = TranscriptView::from_messages(stored);
        if let Some(pending) = &self.pending {
            reloaded.promote(pending.message());
        }
        if let Some(draft) = draft {
            reloaded.set_draft(draft);
        }
        *view = reloaded;

        for line in transcript_lines(&view) {
            println!("{}", line);
        }
    }

    async fn sessions(&self) {
        match self.app.sessions.sessions(&self.app.user).await {
            Ok(sessions) => {
                for session in sessions {
                    let marker = if Some(session.id) == self.session { "*" } else { " " };
                    println!(
                        "{} {}  {}",
                        marker,
                        session.id,
                        session.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            Err(e) => eprintln!("Could not list sessions: {}", e),
        }
    }

    async fn configure(&self, args: &[&str]) {
        let Some(base_url) = args.first() else {
            println!("Usage: /configure <base-url> [api-key] [model]");
            return;
        };

        let mut config = ProviderConfig::new(*base_url, args.get(1).copied().unwrap_or_default());
        if let Some(model) = args.get(2) {
            config = config.with_model(*model);
        }

        match self.app.provider.update(&config).await {
            Ok(()) => println!("Provider set to {} ({}).", config.base_url, config.model()),
            Err(e) => eprintln!("Could not save provider configuration: {}", e),
        }
    }
}
