//! The external command channel.
//!
//! [`CommandChannel`] polls a [`Mailbox`] at a fixed period. A reset command
//! navigates the host back to its base location; any other command is handed
//! to the session's external send entry point. Transport failures are logged
//! and the next tick proceeds on schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::host::Navigator;
use crate::mailbox::Mailbox;
use crate::observability::{MAILBOX_COMMANDS, MAILBOX_ERRORS, MAILBOX_POLLS};
use crate::types::{ExternalCommand, ProviderInfo};

/// Overrides carried by an external send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalSendOptions {
    /// Model to switch to before sending.
    pub model: Option<String>,
    /// Provider to switch to before sending.
    pub provider: Option<ProviderInfo>,
    /// Input to place in the draft before sending.
    pub input: Option<String>,
    /// Attachments to send.
    pub image_data_list: Option<Vec<String>>,
}

impl From<ExternalCommand> for ExternalSendOptions {
    fn from(command: ExternalCommand) -> Self {
        Self {
            model: command.model,
            provider: command.provider,
            input: command.input,
            image_data_list: command.image_data_list,
        }
    }
}

/// Receives commands forwarded by the channel.
pub trait CommandTarget: Send + Sync {
    /// Apply overrides and schedule a send of the current input.
    fn external_send(&self, options: ExternalSendOptions);
}

/// What one poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The mailbox was empty.
    Idle,
    /// A reset command navigated the host.
    Reset,
    /// A command was forwarded to the target.
    Forwarded,
    /// The mailbox could not be reached; carries the error text.
    TransportError(String),
}

/// Polls a mailbox and dispatches what it finds.
pub struct CommandChannel {
    mailbox: Arc<dyn Mailbox>,
    target: Arc<dyn CommandTarget>,
    navigator: Arc<dyn Navigator>,
    period: Duration,
    reset_location: String,
}

impl CommandChannel {
    /// Create a channel. Nothing is polled until [`CommandChannel::run`] or
    /// [`CommandChannel::tick`] is called.
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        target: Arc<dyn CommandTarget>,
        navigator: Arc<dyn Navigator>,
        period: Duration,
        reset_location: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            target,
            navigator,
            period,
            reset_location: reset_location.into(),
        }
    }

    /// Poll once.
    pub async fn tick(&self) -> TickOutcome {
        MAILBOX_POLLS.click();
        let command = match self.mailbox.take().await {
            Ok(Some(command)) => command,
            Ok(None) => return TickOutcome::Idle,
            Err(err) => {
                MAILBOX_ERRORS.click();
                tracing::warn!(component = "channel", action = "poll", error = %err);
                return TickOutcome::TransportError(err.to_string());
            }
        };
        MAILBOX_COMMANDS.click();

        if command.is_reset() {
            tracing::info!(
                component = "channel",
                action = "reset",
                location = %self.reset_location
            );
            self.navigator.reset(&self.reset_location);
            return TickOutcome::Reset;
        }

        tracing::info!(
            component = "channel",
            action = "forward",
            model = ?command.model,
            provider = ?command.provider.as_ref().map(|p| &p.name),
            has_input = command.input.is_some()
        );
        self.target.external_send(command.into());
        TickOutcome::Forwarded
    }

    /// Poll every period until `shutdown` fires.
    ///
    /// The first poll happens one period after start. A slow poll delays the
    /// following one rather than bunching ticks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                outcome = self.tick() => {
                    tracing::debug!(component = "channel", action = "tick", ?outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::mailbox::SlotMailbox;
    use crate::{Error, Result};

    #[derive(Default)]
    struct Recorder {
        sends: Mutex<Vec<ExternalSendOptions>>,
        resets: Mutex<Vec<String>>,
    }

    impl CommandTarget for Recorder {
        fn external_send(&self, options: ExternalSendOptions) {
            self.sends.lock().unwrap().push(options);
        }
    }

    impl Navigator for Recorder {
        fn reset(&self, location: &str) {
            self.resets.lock().unwrap().push(location.to_string());
        }
    }

    struct BrokenMailbox;

    #[async_trait::async_trait]
    impl Mailbox for BrokenMailbox {
        async fn take(&self) -> Result<Option<ExternalCommand>> {
            Err(Error::connection("refused", None))
        }

        async fn post(&self, _: ExternalCommand) -> Result<()> {
            Err(Error::connection("refused", None))
        }
    }

    fn channel(mailbox: Arc<dyn Mailbox>) -> (CommandChannel, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let channel = CommandChannel::new(
            mailbox,
            recorder.clone(),
            recorder.clone(),
            Duration::from_secs(2),
            "http://localhost:5173",
        );
        (channel, recorder)
    }

    #[tokio::test]
    async fn empty_mailbox_is_idle() {
        let (channel, recorder) = channel(Arc::new(SlotMailbox::new()));
        assert_eq!(channel.tick().await, TickOutcome::Idle);
        assert!(recorder.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_takes_precedence() {
        let mailbox = Arc::new(SlotMailbox::new());
        mailbox
            .post(ExternalCommand {
                reset: Some(true),
                input: Some("ignored".to_string()),
                model: Some("gpt-x".to_string()),
                ..ExternalCommand::default()
            })
            .await
            .unwrap();
        let (channel, recorder) = channel(mailbox);
        assert_eq!(channel.tick().await, TickOutcome::Reset);
        assert_eq!(
            *recorder.resets.lock().unwrap(),
            vec!["http://localhost:5173".to_string()]
        );
        assert!(recorder.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn command_is_forwarded_once() {
        let mailbox = Arc::new(SlotMailbox::new());
        mailbox
            .post(ExternalCommand::send("hello").with_model("gpt-x"))
            .await
            .unwrap();
        let (channel, recorder) = channel(mailbox);
        assert_eq!(channel.tick().await, TickOutcome::Forwarded);
        assert_eq!(channel.tick().await, TickOutcome::Idle);
        let sends = recorder.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].model.as_deref(), Some("gpt-x"));
        assert_eq!(sends[0].input.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn transport_errors_are_reported() {
        let (channel, recorder) = channel(Arc::new(BrokenMailbox));
        assert!(matches!(channel.tick().await, TickOutcome::TransportError(_)));
        assert!(recorder.sends.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_schedule_despite_errors() {
        struct Counting {
            polls: Mutex<u32>,
        }

        #[async_trait::async_trait]
        impl Mailbox for Counting {
            async fn take(&self) -> Result<Option<ExternalCommand>> {
                *self.polls.lock().unwrap() += 1;
                Err(Error::timeout("slow", None))
            }

            async fn post(&self, _: ExternalCommand) -> Result<()> {
                Ok(())
            }
        }

        let mailbox = Arc::new(Counting {
            polls: Mutex::new(0),
        });
        let (channel, _) = channel(mailbox.clone());
        let shutdown = CancellationToken::new();
        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { channel.run(shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(*mailbox.polls.lock().unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(*mailbox.polls.lock().unwrap(), 3);
        shutdown.cancel();
        task.await.unwrap();
    }
}
