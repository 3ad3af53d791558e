//! The post-turn pipeline.
//!
//! After a successful turn has settled, the pipeline first offers the turn to
//! a host [`PostTurnHook`]. If the hook does not take over, the workspace is
//! exported and the export is validated. A validation verdict becomes a
//! notification; anything inconclusive is posted back to the feedback mailbox
//! as a new external command, which lets automated sessions run turn after
//! turn without a human.

use std::sync::Arc;

use crate::backend::ValidationBackend;
use crate::host::Workspace;
use crate::mailbox::Mailbox;
use crate::observability::{PIPELINE_RESUBMISSIONS, PIPELINE_VALIDATIONS};
use crate::render::Renderer;
use crate::types::{ExternalCommand, ProviderInfo, Usage, ValidationStatus};

/// Summary of a completed turn handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Model the turn ran with.
    pub model: String,
    /// Provider the turn ran with.
    pub provider: ProviderInfo,
    /// Token usage.
    pub usage: Usage,
    /// Length of the assistant reply in bytes.
    pub message_length: usize,
    /// Why generation ended, if the backend said.
    pub finish_reason: Option<String>,
}

/// Host capability that may take over after a turn.
#[async_trait::async_trait]
pub trait PostTurnHook: Send + Sync {
    /// Returns true if the hook acted, in which case export and validation are
    /// skipped.
    async fn activate(&self, result: &TurnResult) -> bool;
}

/// A hook that never acts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

#[async_trait::async_trait]
impl PostTurnHook for NoopHook {
    async fn activate(&self, _: &TurnResult) -> bool {
        false
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The hook took over.
    HookActivated,
    /// Validation reported success.
    Succeeded,
    /// Validation reported an error; carries the detail.
    Failed(String),
    /// The inconclusive result was posted back as a command.
    Resubmitted,
    /// Export, validation, or the feedback post failed; carries the error text.
    TransportError(String),
}

/// Export, validate, and feed back.
#[derive(Clone)]
pub struct PostTurnPipeline {
    hook: Arc<dyn PostTurnHook>,
    workspace: Arc<dyn Workspace>,
    validator: Arc<dyn ValidationBackend>,
    feedback: Arc<dyn Mailbox>,
    renderer: Arc<dyn Renderer>,
}

impl PostTurnPipeline {
    /// Create a pipeline. `feedback` receives inconclusive results; wiring it to
    /// the same mailbox the command channel polls closes the automation loop.
    pub fn new(
        hook: Arc<dyn PostTurnHook>,
        workspace: Arc<dyn Workspace>,
        validator: Arc<dyn ValidationBackend>,
        feedback: Arc<dyn Mailbox>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            hook,
            workspace,
            validator,
            feedback,
            renderer,
        }
    }

    /// Run the pipeline for one completed turn.
    ///
    /// Transport failures are logged and returned, never rendered.
    pub async fn run(&self, result: &TurnResult) -> PipelineOutcome {
        if self.hook.activate(result).await {
            tracing::debug!(component = "pipeline", action = "hook", "hook took over");
            return PipelineOutcome::HookActivated;
        }

        let file_name = match self.workspace.export().await {
            Ok(file_name) => file_name,
            Err(err) => {
                tracing::warn!(component = "pipeline", action = "export", error = %err);
                return PipelineOutcome::TransportError(err.to_string());
            }
        };
        tracing::debug!(component = "pipeline", action = "export", ?file_name);

        PIPELINE_VALIDATIONS.click();
        let report = match self.validator.validate(file_name.as_deref()).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(component = "pipeline", action = "validate", error = %err);
                return PipelineOutcome::TransportError(err.to_string());
            }
        };

        match report.status() {
            ValidationStatus::Success => {
                self.renderer.print_success("Successfully generated!");
                PipelineOutcome::Succeeded
            }
            ValidationStatus::Error => {
                let detail = report.result_text();
                self.renderer.print_error(&format!("Error: {detail}"));
                PipelineOutcome::Failed(detail)
            }
            ValidationStatus::Inconclusive(message) => {
                let command = ExternalCommand {
                    reset: None,
                    model: report.model.clone(),
                    provider: report.provider.as_deref().map(ProviderInfo::named),
                    input: Some(report.result_text()),
                    image_data_list: Some(Vec::new()),
                };
                match self.feedback.post(command).await {
                    Ok(()) => {
                        PIPELINE_RESUBMISSIONS.click();
                        tracing::info!(
                            component = "pipeline",
                            action = "resubmit",
                            verdict = %message,
                            model = ?report.model,
                            provider = ?report.provider
                        );
                        PipelineOutcome::Resubmitted
                    }
                    Err(err) => {
                        tracing::warn!(component = "pipeline", action = "resubmit", error = %err);
                        PipelineOutcome::TransportError(err.to_string())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::mailbox::SlotMailbox;
    use crate::render::{CapturingRenderer, Notification};
    use crate::types::ValidationReport;
    use crate::{Error, Result};

    struct FixedValidator {
        report: Result<ValidationReport>,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl ValidationBackend for FixedValidator {
        async fn validate(&self, file_name: Option<&str>) -> Result<ValidationReport> {
            self.seen
                .lock()
                .unwrap()
                .push(file_name.map(str::to_string));
            self.report.clone()
        }
    }

    struct ExportingWorkspace;

    #[async_trait::async_trait]
    impl Workspace for ExportingWorkspace {
        async fn export(&self) -> Result<Option<String>> {
            Ok(Some("project.zip".to_string()))
        }
    }

    struct ActiveHook;

    #[async_trait::async_trait]
    impl PostTurnHook for ActiveHook {
        async fn activate(&self, _: &TurnResult) -> bool {
            true
        }
    }

    struct Fixture {
        pipeline: PostTurnPipeline,
        validator: Arc<FixedValidator>,
        mailbox: Arc<SlotMailbox>,
        renderer: Arc<CapturingRenderer>,
    }

    fn fixture(hook: Arc<dyn PostTurnHook>, report: Result<ValidationReport>) -> Fixture {
        let validator = Arc::new(FixedValidator {
            report,
            seen: Mutex::new(Vec::new()),
        });
        let mailbox = Arc::new(SlotMailbox::new());
        let renderer = Arc::new(CapturingRenderer::new());
        let pipeline = PostTurnPipeline::new(
            hook,
            Arc::new(ExportingWorkspace),
            validator.clone(),
            mailbox.clone(),
            renderer.clone(),
        );
        Fixture {
            pipeline,
            validator,
            mailbox,
            renderer,
        }
    }

    fn report(value: serde_json::Value) -> Result<ValidationReport> {
        Ok(serde_json::from_value(value).unwrap())
    }

    fn turn() -> TurnResult {
        TurnResult {
            model: "m".to_string(),
            provider: ProviderInfo::named("P"),
            usage: Usage::new(1, 2),
            message_length: 10,
            finish_reason: Some("stop".to_string()),
        }
    }

    #[tokio::test]
    async fn hook_skips_validation() {
        let f = fixture(Arc::new(ActiveHook), report(json!({"message": "success"})));
        assert_eq!(f.pipeline.run(&turn()).await, PipelineOutcome::HookActivated);
        assert!(f.validator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_is_announced() {
        let f = fixture(Arc::new(NoopHook), report(json!({"message": "success"})));
        assert_eq!(f.pipeline.run(&turn()).await, PipelineOutcome::Succeeded);
        assert_eq!(
            *f.validator.seen.lock().unwrap(),
            vec![Some("project.zip".to_string())]
        );
        assert_eq!(
            f.renderer.notifications(),
            vec![Notification::Success("Successfully generated!".to_string())]
        );
        assert!(!f.mailbox.is_pending());
    }

    #[tokio::test]
    async fn error_carries_detail() {
        let f = fixture(
            Arc::new(NoopHook),
            report(json!({"message": "error", "result": "build failed"})),
        );
        assert_eq!(
            f.pipeline.run(&turn()).await,
            PipelineOutcome::Failed("build failed".to_string())
        );
        assert_eq!(
            f.renderer.notifications(),
            vec![Notification::Error("Error: build failed".to_string())]
        );
    }

    #[tokio::test]
    async fn inconclusive_result_is_resubmitted() {
        let f = fixture(
            Arc::new(NoopHook),
            report(json!({
                "message": "continue",
                "result": "Add a footer",
                "model": "gpt-x",
                "provider": "OpenAI"
            })),
        );
        assert_eq!(f.pipeline.run(&turn()).await, PipelineOutcome::Resubmitted);
        let command = f.mailbox.take().await.unwrap().unwrap();
        assert_eq!(command.input.as_deref(), Some("Add a footer"));
        assert_eq!(command.model.as_deref(), Some("gpt-x"));
        assert_eq!(command.provider, Some(ProviderInfo::named("OpenAI")));
        assert_eq!(command.image_data_list, Some(Vec::new()));
        assert!(!command.is_reset());
        assert!(f.renderer.notifications().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_is_silent() {
        let f = fixture(
            Arc::new(NoopHook),
            Err(Error::unavailable(503, "down", None)),
        );
        assert!(matches!(
            f.pipeline.run(&turn()).await,
            PipelineOutcome::TransportError(_)
        ));
        assert!(f.renderer.notifications().is_empty());
    }
}
