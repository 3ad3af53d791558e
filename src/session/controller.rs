use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{CompletionBackend, TemplateBackend, ValidationBackend};
use crate::channel::{CommandTarget, ExternalSendOptions};
use crate::conversation::{Conversation, files_to_artifact, framed_user_message, next_message_id, now_millis};
use crate::host::{HistoryStore, NullHistoryStore, NullWorkspace, Workspace};
use crate::kv::{
    API_KEYS_KEY, CACHED_PROMPT_KEY, KeyValueStore, MemoryKeyValueStore, SELECTED_MODEL_KEY,
    SELECTED_PROVIDER_KEY,
};
use crate::mailbox::Mailbox;
use crate::observability::{
    ASSISTANT_MESSAGE_LENGTH, COMPLETION_TOKENS, PROMPT_TOKENS, TURN_DURATION, TURNS_ABORTED,
    TURNS_COMPLETED, TURNS_FAILED, TURNS_STARTED,
};
use crate::pipeline::{NoopHook, PipelineOutcome, PostTurnHook, PostTurnPipeline, TurnResult};
use crate::prompt_library::PromptLibrary;
use crate::render::{NullRenderer, Renderer};
use crate::sampler::Sampler;
use crate::session::SessionConfig;
use crate::streaming::{StreamingClient, TurnOutcome, TurnSink};
use crate::template::TemplateResolver;
use crate::types::{ChatRequest, Message, ProviderInfo, Role, TemplateRequest, Usage};
use crate::{Error, Result};

/// Where a session is in its turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Ready for a new turn.
    Idle,
    /// First turn accepted; template resolution has not finished.
    AwaitingTemplate,
    /// The completion stream is being applied.
    Streaming,
    /// The last turn failed; the next send retries it.
    Errored,
    /// The last turn was aborted.
    Aborted,
}

impl SessionPhase {
    /// Returns true while a turn is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, SessionPhase::AwaitingTemplate | SessionPhase::Streaming)
    }
}

/// A request to send a message.
///
/// Unset fields fall back to the session's current draft input, pending
/// attachments, model, and provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    /// Message text; `None` sends the current draft input.
    pub content: Option<String>,
    /// Image data URLs; `None` sends the pending attachments.
    pub images: Option<Vec<String>>,
    /// Model to switch to before sending.
    pub model: Option<String>,
    /// Provider to switch to before sending.
    pub provider: Option<ProviderInfo>,
}

impl SendRequest {
    /// Send `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Send whatever is in the draft input.
    pub fn current_input() -> Self {
        Self::default()
    }

    /// Attach images.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the provider.
    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// What a call to [`Session::send_message`] did.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The text was empty; nothing happened.
    Ignored,
    /// A turn was in flight, so the call aborted it instead of sending.
    Aborted,
    /// The turn finished.
    Completed(Usage),
    /// The turn failed; the error has been reported.
    Failed(Error),
    /// The turn was aborted before it finished.
    Cancelled,
}

/// Statistics about the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// The active model.
    pub model: String,
    /// The active provider.
    pub provider: ProviderInfo,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Completed turns.
    pub turns: u64,
    /// Usage summed over completed turns.
    pub total_usage: Usage,
    /// Usage of the most recent completed turn.
    pub last_usage: Option<Usage>,
    /// The current phase.
    pub phase: SessionPhase,
}

struct SessionState {
    phase: SessionPhase,
    conversation: Conversation,
    model: String,
    provider: ProviderInfo,
    input: String,
    pending_images: Vec<String>,
    last_error: Option<Error>,
    aborted: bool,
    stream_data: Vec<Value>,
    turn: u64,
    cancel: Option<CancellationToken>,
    turn_started: Option<Instant>,
    turns: u64,
    total_usage: Usage,
    last_usage: Option<Usage>,
    pipeline_task: Option<JoinHandle<PipelineOutcome>>,
}

impl SessionState {
    fn is_current(&self, turn: u64) -> bool {
        self.turn == turn && self.phase == SessionPhase::Streaming
    }
}

struct SessionInner {
    config: SessionConfig,
    api_keys: BTreeMap<String, String>,
    state: Mutex<SessionState>,
    streaming: StreamingClient,
    resolver: Option<TemplateResolver>,
    pipeline: Option<PostTurnPipeline>,
    workspace: Arc<dyn Workspace>,
    history: Arc<dyn HistoryStore>,
    kv: Arc<dyn KeyValueStore>,
    renderer: Arc<dyn Renderer>,
    sampler: Sampler<bool>,
    draft: Sampler<()>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The sampled handler: refresh the parsed projection and persist.
    ///
    /// Always reads the latest snapshot, so the argument only records whether
    /// the session was loading when the sample was requested.
    fn on_sample(&self, is_loading: bool) {
        let snapshot = {
            let mut state = self.lock();
            state.conversation.refresh_projection();
            state
                .conversation
                .has_grown()
                .then(|| state.conversation.messages().to_vec())
        };
        let Some(messages) = snapshot else {
            return;
        };
        tracing::trace!(
            component = "session",
            action = "persist",
            messages = messages.len(),
            is_loading
        );
        if let Err(err) = self.history.store_message_history(&messages) {
            tracing::warn!(component = "session", action = "persist", error = %err);
            self.renderer.print_error(&err.to_string());
        }
    }

    fn on_draft(&self) {
        let input = self.lock().input.trim().to_string();
        let result = if input.is_empty() {
            self.kv.remove(CACHED_PROMPT_KEY)
        } else {
            self.kv
                .set(CACHED_PROMPT_KEY, &input, Some(self.config.cookie_expiry_days))
        };
        if let Err(err) = result {
            tracing::warn!(component = "session", action = "draft", error = %err);
        }
    }
}

/// Builds a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    completion: Option<Arc<dyn CompletionBackend>>,
    templates: Option<Arc<dyn TemplateBackend>>,
    validator: Option<Arc<dyn ValidationBackend>>,
    feedback: Option<Arc<dyn Mailbox>>,
    hook: Arc<dyn PostTurnHook>,
    workspace: Arc<dyn Workspace>,
    history: Arc<dyn HistoryStore>,
    kv: Arc<dyn KeyValueStore>,
    renderer: Arc<dyn Renderer>,
    initial_messages: Vec<Message>,
}

impl SessionBuilder {
    /// Start building a session with `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            completion: None,
            templates: None,
            validator: None,
            feedback: None,
            hook: Arc::new(NoopHook),
            workspace: Arc::new(NullWorkspace),
            history: Arc::new(NullHistoryStore),
            kv: Arc::new(MemoryKeyValueStore::new()),
            renderer: Arc::new(NullRenderer),
            initial_messages: Vec::new(),
        }
    }

    /// The completion backend. Required.
    pub fn completion_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.completion = Some(backend);
        self
    }

    /// The template classification backend. Without one every first turn
    /// takes the blank path.
    pub fn template_backend(mut self, backend: Arc<dyn TemplateBackend>) -> Self {
        self.templates = Some(backend);
        self
    }

    /// The validation backend. The post-turn pipeline runs only when this and
    /// a feedback mailbox are both set.
    pub fn validation_backend(mut self, backend: Arc<dyn ValidationBackend>) -> Self {
        self.validator = Some(backend);
        self
    }

    /// Where inconclusive validation results are posted.
    pub fn feedback_mailbox(mut self, mailbox: Arc<dyn Mailbox>) -> Self {
        self.feedback = Some(mailbox);
        self
    }

    /// The post-turn hook.
    pub fn post_turn_hook(mut self, hook: Arc<dyn PostTurnHook>) -> Self {
        self.hook = hook;
        self
    }

    /// The workspace collaborator.
    pub fn workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = workspace;
        self
    }

    /// The history store.
    pub fn history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    /// The key-value store for selections, drafts, and API keys.
    pub fn key_value_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    /// The renderer.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Messages to restore; a non-empty history skips the first-turn path.
    pub fn initial_messages(mut self, messages: Vec<Message>) -> Self {
        self.initial_messages = messages;
        self
    }

    /// Build the session.
    ///
    /// Fails with a configuration error if the prompt id is unknown or no
    /// completion backend was given.
    pub fn build(self) -> Result<Session> {
        PromptLibrary::get(&self.config.prompt_id)?;
        let completion = self
            .completion
            .ok_or_else(|| Error::configuration("a completion backend is required"))?;

        let kv = self.kv;
        let config = self.config;
        let model = kv
            .get(SELECTED_MODEL_KEY)
            .unwrap_or_else(|| config.model.clone());
        let provider = kv
            .get(SELECTED_PROVIDER_KEY)
            .and_then(|name| config.find_provider(&name).cloned())
            .unwrap_or_else(|| config.provider.clone());
        let input = kv.get(CACHED_PROMPT_KEY).unwrap_or_default();
        let mut api_keys = config.api_keys.clone();
        if let Some(raw) = kv.get(API_KEYS_KEY) {
            match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(stored) => api_keys.extend(stored),
                Err(err) => {
                    tracing::warn!(component = "session", action = "restore", key = API_KEYS_KEY, error = %err);
                }
            }
        }
        tracing::debug!(
            component = "session",
            action = "restore",
            model = %model,
            provider = %provider,
            messages = self.initial_messages.len()
        );

        let renderer = self.renderer;
        let resolver = self
            .templates
            .map(|backend| TemplateResolver::new(backend, Arc::clone(&renderer)));
        let pipeline = match (self.validator, self.feedback) {
            (Some(validator), Some(feedback)) => Some(PostTurnPipeline::new(
                self.hook,
                Arc::clone(&self.workspace),
                validator,
                feedback,
                Arc::clone(&renderer),
            )),
            _ => None,
        };
        let state = SessionState {
            phase: SessionPhase::Idle,
            conversation: Conversation::restored(self.initial_messages),
            model,
            provider,
            input,
            pending_images: Vec::new(),
            last_error: None,
            aborted: false,
            stream_data: Vec::new(),
            turn: 0,
            cancel: None,
            turn_started: None,
            turns: 0,
            total_usage: Usage::default(),
            last_usage: None,
            pipeline_task: None,
        };

        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let sample = weak.clone();
            let sampler = Sampler::new(config.sample_interval, move |is_loading| {
                if let Some(inner) = sample.upgrade() {
                    inner.on_sample(is_loading);
                }
            });
            let draft = weak.clone();
            let draft = Sampler::new(config.draft_interval, move |()| {
                if let Some(inner) = draft.upgrade() {
                    inner.on_draft();
                }
            });
            SessionInner {
                config,
                api_keys,
                state: Mutex::new(state),
                streaming: StreamingClient::new(completion),
                resolver,
                pipeline,
                workspace: self.workspace,
                history: self.history,
                kv,
                renderer,
                sampler,
                draft,
            }
        });
        Ok(Session { inner })
    }
}

/// Prepared by the synchronous half of a send.
struct TurnStart {
    turn: u64,
    cancel: CancellationToken,
    first: bool,
    text: String,
    images: Vec<String>,
    model: String,
    provider: ProviderInfo,
}

/// Applies stream effects for one turn, refusing once the turn is stale.
struct TurnGuard<'a> {
    inner: &'a SessionInner,
    turn: u64,
}

impl TurnSink for TurnGuard<'_> {
    fn append_text(&self, delta: &str) -> bool {
        {
            let mut state = self.inner.lock();
            if !state.is_current(self.turn) {
                return false;
            }
            state.conversation.append_assistant_text(delta);
        }
        self.inner.renderer.print_text(delta);
        self.inner.sampler.call(true);
        true
    }

    fn push_data(&self, data: Vec<Value>) -> bool {
        let mut state = self.inner.lock();
        if !state.is_current(self.turn) {
            return false;
        }
        state.stream_data.extend(data);
        true
    }
}

/// The session controller.
///
/// `Session` is a cheap handle; clones share one conversation. All mutation of
/// the conversation and session state goes through its methods.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start building a session.
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Send a message, or abort the turn in flight.
    ///
    /// Empty text is ignored. While a turn is in flight the call aborts it
    /// instead of sending. Otherwise the returned future drives the turn to its
    /// end; the post-turn pipeline is scheduled separately.
    pub async fn send_message(&self, request: SendRequest) -> SendOutcome {
        let SendRequest {
            content,
            images,
            model,
            provider,
        } = request;
        let text = match content {
            Some(text) => text,
            None => self.inner.lock().input.clone(),
        };
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let start = {
            let mut state = self.inner.lock();
            if state.phase.is_busy() {
                None
            } else {
                Some(self.begin_turn(&mut state, text, images, model, provider))
            }
        };
        let Some(start) = start else {
            self.abort();
            return SendOutcome::Aborted;
        };
        TURNS_STARTED.click();
        self.inner.sampler.call(true);

        if start.first && !self.seed_first_turn(&start).await {
            return SendOutcome::Cancelled;
        }

        let request = {
            let state = self.inner.lock();
            if !state.is_current(start.turn) {
                return SendOutcome::Cancelled;
            }
            self.chat_request(&state)
        };
        self.inner.sampler.call(true);
        tracing::debug!(
            component = "session",
            action = "stream",
            model = %start.model,
            provider = %start.provider,
            messages = request.messages.len()
        );
        let guard = TurnGuard {
            inner: &self.inner,
            turn: start.turn,
        };
        let outcome = self
            .inner
            .streaming
            .run(request, start.cancel.clone(), &guard)
            .await;
        self.finish_turn(&start, outcome)
    }

    fn begin_turn(
        &self,
        state: &mut SessionState,
        text: String,
        images: Option<Vec<String>>,
        model: Option<String>,
        provider: Option<ProviderInfo>,
    ) -> TurnStart {
        // Overrides apply to this turn only.
        let model = model.unwrap_or_else(|| state.model.clone());
        let provider = provider.unwrap_or_else(|| state.provider.clone());
        let images = images.unwrap_or_else(|| std::mem::take(&mut state.pending_images));
        let retry = state.phase == SessionPhase::Errored;

        state.turn += 1;
        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        state.aborted = false;
        state.last_error = None;
        state.stream_data.clear();
        state.turn_started = Some(Instant::now());

        let first = state.conversation.is_empty();
        if first {
            state.phase = SessionPhase::AwaitingTemplate;
        } else {
            if retry {
                state.conversation.drop_last();
            }
            let files = self.inner.workspace.modified_files();
            let body = if files.is_empty() {
                text.clone()
            } else {
                let artifact = files_to_artifact(&files, &now_millis().to_string());
                self.inner.workspace.reset_file_modifications();
                format!("{artifact}{text}")
            };
            let message = framed_user_message(
                next_message_id(),
                &model,
                &provider.name,
                &body,
                &images,
            );
            state.conversation.push(message);
            state.phase = SessionPhase::Streaming;
            self.clear_handoff(state);
        }

        TurnStart {
            turn: state.turn,
            cancel,
            first,
            text,
            images,
            model,
            provider,
        }
    }

    /// Seed the empty conversation. Returns false if the turn was aborted while
    /// the template was being resolved.
    async fn seed_first_turn(&self, start: &TurnStart) -> bool {
        let seeded = match &self.inner.resolver {
            Some(resolver) if self.inner.config.auto_select_template => {
                let request = TemplateRequest {
                    message: start.text.clone(),
                    model: start.model.clone(),
                    provider: start.provider.name.clone(),
                };
                tokio::select! {
                    biased;
                    _ = start.cancel.cancelled() => return false,
                    seeded = resolver.resolve(&request, &start.images) => seeded,
                }
            }
            _ => None,
        };

        let mut state = self.inner.lock();
        if state.turn != start.turn || state.phase != SessionPhase::AwaitingTemplate {
            return false;
        }
        match seeded {
            Some(messages) => state.conversation.extend(messages),
            None => state.conversation.push(framed_user_message(
                now_millis().to_string(),
                &start.model,
                &start.provider.name,
                &start.text,
                &start.images,
            )),
        }
        state.phase = SessionPhase::Streaming;
        self.clear_handoff(&mut state);
        true
    }

    fn clear_handoff(&self, state: &mut SessionState) {
        state.input.clear();
        state.pending_images.clear();
        if let Err(err) = self.inner.kv.remove(CACHED_PROMPT_KEY) {
            tracing::warn!(component = "session", action = "draft", error = %err);
        }
    }

    fn chat_request(&self, state: &SessionState) -> ChatRequest {
        let config = &self.inner.config;
        ChatRequest {
            messages: state.conversation.messages().to_vec(),
            api_keys: self.inner.api_keys.clone(),
            files: self.inner.workspace.files(),
            prompt_id: config.prompt_id.clone(),
            context_optimization: config.context_optimization,
            supabase: config.supabase.clone(),
        }
    }

    fn finish_turn(&self, start: &TurnStart, outcome: TurnOutcome) -> SendOutcome {
        let mut state = self.inner.lock();
        if !state.is_current(start.turn) {
            return SendOutcome::Cancelled;
        }
        state.cancel = None;
        let elapsed = state.turn_started.take().map(|t| t.elapsed());
        let model = start.model.clone();
        let provider = start.provider.clone();

        match outcome {
            TurnOutcome::Completed {
                usage,
                finish_reason,
            } => {
                state.phase = SessionPhase::Idle;
                state.stream_data.clear();
                state.turns += 1;
                state.total_usage = state.total_usage + usage;
                state.last_usage = Some(usage);
                let message_length = state
                    .conversation
                    .last()
                    .filter(|m| m.role == Role::Assistant)
                    .map(|m| m.text().len())
                    .unwrap_or(0);
                drop(state);

                TURNS_COMPLETED.click();
                PROMPT_TOKENS.count(usage.prompt_tokens);
                COMPLETION_TOKENS.count(usage.completion_tokens);
                ASSISTANT_MESSAGE_LENGTH.add(message_length as f64);
                if let Some(elapsed) = elapsed {
                    TURN_DURATION.add(elapsed.as_secs_f64());
                }
                tracing::info!(
                    component = "session",
                    action = "response",
                    model = %model,
                    provider = %provider,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    message_length,
                    finish_reason = ?finish_reason
                );
                self.inner.renderer.finish_response();
                self.inner.sampler.flush();
                self.inner.sampler.call(false);
                self.schedule_pipeline(TurnResult {
                    model,
                    provider,
                    usage,
                    message_length,
                    finish_reason,
                });
                SendOutcome::Completed(usage)
            }
            TurnOutcome::Failed(err) => {
                state.phase = SessionPhase::Errored;
                state.last_error = Some(err.clone());
                drop(state);

                TURNS_FAILED.click();
                tracing::error!(
                    component = "session",
                    action = "request",
                    model = %model,
                    provider = %provider,
                    error = %err
                );
                self.inner.renderer.finish_response();
                self.inner.renderer.print_error(&format!(
                    "There was an error processing your request: {err}"
                ));
                self.inner.sampler.call(false);
                SendOutcome::Failed(err)
            }
            // abort() moves the phase off Streaming before cancelling, so this
            // only happens if the token was cancelled some other way.
            TurnOutcome::Aborted => {
                state.phase = SessionPhase::Aborted;
                state.aborted = true;
                SendOutcome::Cancelled
            }
        }
    }

    fn schedule_pipeline(&self, result: TurnResult) {
        let Some(pipeline) = self.inner.pipeline.clone() else {
            return;
        };
        let delay = self.inner.config.post_turn_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = pipeline.run(&result).await;
            tracing::debug!(component = "pipeline", action = "run", ?outcome);
            outcome
        });
        self.inner.lock().pipeline_task = Some(task);
    }

    /// Abort the turn in flight.
    ///
    /// Returns false, changing nothing, when no turn is in flight. Once this
    /// returns no further stream content is applied.
    pub fn abort(&self) -> bool {
        let (model, provider) = {
            let mut state = self.inner.lock();
            if !state.phase.is_busy() {
                return false;
            }
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            state.phase = SessionPhase::Aborted;
            state.aborted = true;
            state.turn_started = None;
            (state.model.clone(), state.provider.clone())
        };
        TURNS_ABORTED.click();
        self.inner.workspace.abort_all_actions();
        tracing::info!(
            component = "session",
            action = "abort",
            model = %model,
            provider = %provider,
            "chat response aborted"
        );
        self.inner.renderer.print_interrupted();
        self.inner.sampler.call(false);
        true
    }

    /// Apply external overrides, then send the current input after the settle
    /// delay.
    pub fn external_send_message(&self, options: ExternalSendOptions) -> JoinHandle<SendOutcome> {
        {
            let mut state = self.inner.lock();
            if let Some(model) = options.model {
                state.model = model;
            }
            if let Some(provider) = options.provider {
                state.provider = provider;
            }
            if let Some(input) = options.input {
                state.input = input;
            }
            if let Some(images) = options.image_data_list {
                state.pending_images = images;
            }
            tracing::info!(
                component = "session",
                action = "external_send",
                model = %state.model,
                provider = %state.provider
            );
        }
        let session = self.clone();
        let delay = self.inner.config.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.send_message(SendRequest::current_input()).await
        })
    }

    /// Switch model and remember the choice.
    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        self.inner.lock().model = model.clone();
        if let Err(err) =
            self.inner
                .kv
                .set(SELECTED_MODEL_KEY, &model, Some(self.inner.config.cookie_expiry_days))
        {
            tracing::warn!(component = "session", action = "select_model", error = %err);
        }
    }

    /// Switch provider and remember the choice.
    pub fn set_provider(&self, provider: ProviderInfo) {
        let name = provider.name.clone();
        self.inner.lock().provider = provider;
        if let Err(err) = self.inner.kv.set(
            SELECTED_PROVIDER_KEY,
            &name,
            Some(self.inner.config.cookie_expiry_days),
        ) {
            tracing::warn!(component = "session", action = "select_provider", error = %err);
        }
    }

    /// Replace the draft input. The draft is saved through a throttle.
    pub fn set_input(&self, input: impl Into<String>) {
        self.inner.lock().input = input.into();
        self.inner.draft.call(());
    }

    /// Queue an image to go out with the next send.
    pub fn attach_image(&self, data_url: impl Into<String>) {
        self.inner.lock().pending_images.push(data_url.into());
    }

    /// Run pending sampled work now.
    pub fn flush(&self) {
        self.inner.sampler.flush();
        self.inner.draft.flush();
    }

    /// Take the most recently scheduled post-turn pipeline run.
    pub fn take_pipeline_task(&self) -> Option<JoinHandle<PipelineOutcome>> {
        self.inner.lock().pipeline_task.take()
    }

    /// The current phase.
    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    /// True while a turn is in flight, including template resolution.
    pub fn is_streaming(&self) -> bool {
        self.phase().is_busy()
    }

    /// True while the first turn waits for template resolution.
    pub fn is_fake_loading(&self) -> bool {
        self.phase() == SessionPhase::AwaitingTemplate
    }

    /// True if the last turn was aborted.
    pub fn was_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    /// The error that ended the last turn, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.lock().last_error.clone()
    }

    /// The full message history.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().conversation.messages().to_vec()
    }

    /// The parsed projection as of the last sample.
    pub fn rendered_messages(&self) -> Vec<Message> {
        self.inner.lock().conversation.rendered().to_vec()
    }

    /// Data frames received during the current turn.
    pub fn stream_data(&self) -> Vec<Value> {
        self.inner.lock().stream_data.clone()
    }

    /// The active model.
    pub fn model(&self) -> String {
        self.inner.lock().model.clone()
    }

    /// The active provider.
    pub fn provider(&self) -> ProviderInfo {
        self.inner.lock().provider.clone()
    }

    /// The draft input.
    pub fn input(&self) -> String {
        self.inner.lock().input.clone()
    }

    /// Attachments waiting for the next send.
    pub fn pending_images(&self) -> Vec<String> {
        self.inner.lock().pending_images.clone()
    }

    /// Statistics about the session.
    pub fn stats(&self) -> SessionStats {
        let state = self.inner.lock();
        SessionStats {
            model: state.model.clone(),
            provider: state.provider.clone(),
            message_count: state.conversation.len(),
            turns: state.turns,
            total_usage: state.total_usage,
            last_usage: state.last_usage,
            phase: state.phase,
        }
    }
}

impl CommandTarget for Session {
    fn external_send(&self, options: ExternalSendOptions) {
        drop(self.external_send_message(options));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::backend::EventStream;
    use crate::render::{CapturingRenderer, Notification};
    use crate::types::StreamEvent;

    struct Scripted {
        events: Vec<StreamEvent>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(events: Vec<StreamEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for Scripted {
        async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream> {
            self.requests.lock().unwrap().push(request);
            let events: Vec<Result<StreamEvent>> = self.events.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(events)))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new()
            .with_auto_select_template(false)
            .with_model("m")
            .with_provider(ProviderInfo::named("OpenAI"))
    }

    fn reply(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::FinishMessage {
                finish_reason: Some("stop".to_string()),
                usage: Some(Usage::new(3, 4)),
            },
        ]
    }

    #[test]
    fn unknown_prompt_is_configuration_error() {
        let err = Session::builder(config().with_prompt_id("nope"))
            .completion_backend(Scripted::new(Vec::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_backend_is_configuration_error() {
        let err = Session::builder(config()).build().err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn restores_selection_from_store() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(SELECTED_MODEL_KEY, "gpt-x", None).unwrap();
        kv.set(SELECTED_PROVIDER_KEY, "Groq", None).unwrap();
        kv.set(CACHED_PROMPT_KEY, "draft", None).unwrap();
        kv.set(API_KEYS_KEY, r#"{"Groq":"k"}"#, None).unwrap();
        let session = Session::builder(config())
            .completion_backend(Scripted::new(Vec::new()))
            .key_value_store(kv)
            .build()
            .unwrap();
        assert_eq!(session.model(), "gpt-x");
        assert_eq!(session.provider(), ProviderInfo::named("Groq"));
        assert_eq!(session.input(), "draft");
        assert_eq!(session.inner.api_keys.get("Groq").map(String::as_str), Some("k"));
    }

    #[test]
    fn unknown_stored_provider_falls_back() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(SELECTED_PROVIDER_KEY, "Nobody", None).unwrap();
        let session = Session::builder(config())
            .completion_backend(Scripted::new(Vec::new()))
            .key_value_store(kv)
            .build()
            .unwrap();
        assert_eq!(session.provider(), ProviderInfo::named("OpenAI"));
    }

    #[tokio::test]
    async fn empty_text_is_ignored() {
        let backend = Scripted::new(reply("hi"));
        let session = Session::builder(config())
            .completion_backend(backend.clone())
            .build()
            .unwrap();
        assert!(matches!(
            session.send_message(SendRequest::text("   ")).await,
            SendOutcome::Ignored
        ));
        assert!(backend.requests.lock().unwrap().is_empty());
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn turn_appends_reply_and_records_usage() {
        let renderer = Arc::new(CapturingRenderer::new());
        let session = Session::builder(config())
            .completion_backend(Scripted::new(reply("Hello there")))
            .renderer(renderer.clone())
            .build()
            .unwrap();
        let outcome = session.send_message(SendRequest::text("hi")).await;
        assert!(matches!(outcome, SendOutcome::Completed(usage) if usage == Usage::new(3, 4)));
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "[Model: m]\n\n[Provider: OpenAI]\n\nhi");
        assert_eq!(messages[1].text(), "Hello there");
        assert_eq!(renderer.text(), "Hello there");
        assert_eq!(session.phase(), SessionPhase::Idle);
        let stats = session.stats();
        assert_eq!(stats.turns, 1);
        assert_eq!(stats.total_usage, Usage::new(3, 4));
    }

    #[tokio::test]
    async fn request_carries_flags() {
        let backend = Scripted::new(reply("ok"));
        let session = Session::builder(
            config()
                .with_prompt_id("optimized")
                .with_context_optimization(true)
                .with_api_key("OpenAI", "sk"),
        )
        .completion_backend(backend.clone())
        .build()
        .unwrap();
        session.send_message(SendRequest::text("hi")).await;
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].prompt_id, "optimized");
        assert!(requests[0].context_optimization);
        assert_eq!(requests[0].api_keys.get("OpenAI").map(String::as_str), Some("sk"));
    }

    #[tokio::test]
    async fn failure_keeps_partial_reply() {
        let renderer = Arc::new(CapturingRenderer::new());
        let session = Session::builder(config())
            .completion_backend(Scripted::new(vec![
                StreamEvent::TextDelta("partial".to_string()),
                StreamEvent::Error("boom".to_string()),
            ]))
            .renderer(renderer.clone())
            .build()
            .unwrap();
        let outcome = session.send_message(SendRequest::text("hi")).await;
        assert!(matches!(outcome, SendOutcome::Failed(_)));
        assert_eq!(session.phase(), SessionPhase::Errored);
        assert!(session.last_error().is_some());
        assert_eq!(session.messages()[1].text(), "partial");
        assert!(renderer.notifications().iter().any(|n| matches!(
            n,
            Notification::Error(msg) if msg.starts_with("There was an error processing your request: ")
        )));
    }

    #[tokio::test]
    async fn abort_when_idle_is_noop() {
        let session = Session::builder(config())
            .completion_backend(Scripted::new(Vec::new()))
            .build()
            .unwrap();
        assert!(!session.abort());
        assert!(!session.abort());
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.was_aborted());
    }

    #[tokio::test]
    async fn stream_data_is_cleared_on_success() {
        let session = Session::builder(config())
            .completion_backend(Scripted::new(vec![
                StreamEvent::Data(vec![serde_json::json!({"progress": 1})]),
                StreamEvent::TextDelta("x".to_string()),
            ]))
            .build()
            .unwrap();
        session.send_message(SendRequest::text("hi")).await;
        assert!(session.stream_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn draft_is_saved_and_cleared() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let session = Session::builder(config())
            .completion_backend(Scripted::new(reply("ok")))
            .key_value_store(kv.clone())
            .build()
            .unwrap();
        session.set_input("half");
        session.set_input("half a thought");
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(kv.get(CACHED_PROMPT_KEY).as_deref(), Some("half a thought"));

        session.send_message(SendRequest::current_input()).await;
        assert_eq!(kv.get(CACHED_PROMPT_KEY), None);
        assert_eq!(session.input(), "");
        assert!(session.messages()[0].text().ends_with("half a thought"));
    }

    #[tokio::test]
    async fn selection_is_persisted() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let session = Session::builder(config())
            .completion_backend(Scripted::new(Vec::new()))
            .key_value_store(kv.clone())
            .build()
            .unwrap();
        session.set_model("gpt-x");
        session.set_provider(ProviderInfo::named("Groq"));
        assert_eq!(kv.get(SELECTED_MODEL_KEY).as_deref(), Some("gpt-x"));
        assert_eq!(kv.get(SELECTED_PROVIDER_KEY).as_deref(), Some("Groq"));
    }
}
