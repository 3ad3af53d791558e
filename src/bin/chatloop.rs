//! Interactive session controller for a bolt-style chat server.
//!
//! This binary drives one conversation against the server's streamed chat
//! endpoint, polls an external command mailbox, and runs the post-turn
//! validation pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local server
//! chatloop
//!
//! # Pick a model and provider, skip starter templates
//! chatloop --model gpt-4o --provider OpenAI --no-template
//!
//! # Accept commands posted to the server's mailbox and keep a transcript
//! chatloop --mailbox-url http://localhost:5173/api/external-send --transcript chat.json
//! ```
//!
//! # Commands
//!
//! - `/help` - Show available commands
//! - `/model <name>` - Change the model
//! - `/provider <name>` - Change the provider
//! - `/attach <file>` - Attach an image to the next message
//! - `/abort` - Abort the response in progress
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chatloop::channel::{CommandChannel, CommandTarget, ExternalSendOptions};
use chatloop::host::{HistoryStore, Navigator, NullHistoryStore, TranscriptStore};
use chatloop::kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use chatloop::mailbox::{HttpMailbox, Mailbox, SlotMailbox};
use chatloop::render::{PlainTextRenderer, Renderer};
use chatloop::session::{
    SendOutcome, SendRequest, Session, SessionArgs, SessionCommand, SessionConfig,
    attachment_data_url, help_text, parse_command,
};
use chatloop::types::Message;
use chatloop::HttpBackend;

const MAILBOX_TIMEOUT: Duration = Duration::from_secs(10);

type SessionFactory = Box<dyn Fn(Vec<Message>) -> chatloop::Result<Session> + Send + Sync>;

/// Holds the live session; a navigation reset swaps in a fresh one.
struct SessionSlot {
    current: Mutex<Session>,
    factory: SessionFactory,
}

impl SessionSlot {
    fn current(&self) -> Session {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandTarget for SessionSlot {
    fn external_send(&self, options: ExternalSendOptions) {
        self.current().external_send(options);
    }
}

impl Navigator for SessionSlot {
    fn reset(&self, location: &str) {
        let old = self.current();
        old.abort();
        old.flush();
        match (self.factory)(Vec::new()) {
            Ok(fresh) => {
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
                tracing::info!(component = "navigator", action = "reset", location, "started a fresh session");
            }
            Err(err) => {
                tracing::error!(component = "navigator", action = "reset", location, error = %err);
            }
        }
    }
}

/// Main entry point for the chatloop application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatloop=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = SessionArgs::from_command_line_relaxed("chatloop [OPTIONS]");
    let config = SessionConfig::from_args(args)?;

    let backend = Arc::new(HttpBackend::with_options(
        config.base_url.as_deref(),
        config.validation_url.as_deref(),
        None,
    )?);
    let kv: Arc<dyn KeyValueStore> = match config.kv_store_path.as_deref() {
        Some(path) => Arc::new(FileKeyValueStore::open(path)?),
        None => Arc::new(MemoryKeyValueStore::new()),
    };
    let (history, initial): (Arc<dyn HistoryStore>, Vec<Message>) =
        match config.transcript_path.as_deref() {
            Some(path) => {
                let store = TranscriptStore::new(path);
                let initial = store.load()?;
                (Arc::new(store), initial)
            }
            None => (Arc::new(NullHistoryStore), Vec::new()),
        };
    let mailbox: Arc<dyn Mailbox> = match config.mailbox_url.as_deref() {
        Some(url) => Arc::new(HttpMailbox::new(url, MAILBOX_TIMEOUT)?),
        None => Arc::new(SlotMailbox::new()),
    };
    let renderer = Arc::new(PlainTextRenderer::with_color(config.use_color));

    let factory: SessionFactory = {
        let config = config.clone();
        let backend = Arc::clone(&backend);
        let mailbox = Arc::clone(&mailbox);
        let renderer = Arc::clone(&renderer);
        Box::new(move |initial| {
            Session::builder(config.clone())
                .completion_backend(backend.clone())
                .template_backend(backend.clone())
                .validation_backend(backend.clone())
                .feedback_mailbox(mailbox.clone())
                .history_store(history.clone())
                .key_value_store(kv.clone())
                .renderer(renderer.clone())
                .initial_messages(initial)
                .build()
        })
    };
    let session = factory(initial)?;
    let slot = Arc::new(SessionSlot {
        current: Mutex::new(session),
        factory,
    });

    let shutdown = CancellationToken::new();
    let poller = if config.poll_mailbox {
        let channel = CommandChannel::new(
            mailbox,
            slot.clone(),
            slot.clone(),
            config.poll_interval,
            config.reset_location.clone(),
        );
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move { channel.run(shutdown).await }))
    } else {
        None
    };

    // The handler runs on its own thread; enter the runtime so abort can
    // schedule work on it.
    let abort_slot = slot.clone();
    let runtime = tokio::runtime::Handle::current();
    ctrlc::set_handler(move || {
        let _guard = runtime.enter();
        abort_slot.current().abort();
    })?;

    let mut rl = DefaultEditor::new()?;
    {
        let session = slot.current();
        println!(
            "chatloop (model: {}, provider: {})",
            session.model(),
            session.provider()
        );
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);
                let session = slot.current();

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        SessionCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        SessionCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        SessionCommand::Model(model) => {
                            session.set_model(model.clone());
                            renderer.print_info(&format!("Model changed to: {model}"));
                        }
                        SessionCommand::Provider(name) => match session.config().find_provider(&name) {
                            Some(provider) => {
                                session.set_provider(provider.clone());
                                renderer.print_info(&format!("Provider changed to: {name}"));
                            }
                            None => renderer.print_error(&format!("Unknown provider: {name}")),
                        },
                        SessionCommand::Attach(path) => match attachment_data_url(&path) {
                            Ok(url) => {
                                session.attach_image(url);
                                renderer.print_info(&format!("Attached {path}"));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        SessionCommand::Abort => {
                            if !session.abort() {
                                renderer.print_info("Nothing to abort.");
                            }
                        }
                        SessionCommand::Stats => {
                            print_stats(&session);
                        }
                        SessionCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                println!("Assistant:");
                match session.send_message(SendRequest::text(line)).await {
                    SendOutcome::Aborted => renderer.print_info("Previous response aborted."),
                    SendOutcome::Completed(_)
                    | SendOutcome::Failed(_)
                    | SendOutcome::Cancelled
                    | SendOutcome::Ignored => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    shutdown.cancel();
    if let Some(poller) = poller {
        let _ = poller.await;
    }
    let session = slot.current();
    session.abort();
    session.flush();
    Ok(())
}

fn print_stats(session: &Session) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Provider: {}", stats.provider);
    println!("      Messages: {}", stats.message_count);
    println!("      State: {:?}", stats.phase);
    println!(
        "      Total tokens: {} in / {} out ({} turns)",
        stats.total_usage.prompt_tokens, stats.total_usage.completion_tokens, stats.turns
    );
    if let Some(usage) = stats.last_usage {
        println!(
            "      Last turn tokens: {} in / {} out",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
}
