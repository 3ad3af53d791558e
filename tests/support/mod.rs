//! Mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedSender, unbounded};

use chatloop::host::{HistoryStore, Navigator, Workspace};
use chatloop::{
    ChatRequest, CompletionBackend, Error, EventStream, Message, Result, StreamEvent,
    TemplateBackend, TemplateRequest, TemplateSeed, TemplateSelection, ValidationBackend,
    ValidationReport,
};

/// Completion backend whose streams are fed by the test.
#[derive(Default)]
pub struct ControlledBackend {
    requests: Mutex<Vec<ChatRequest>>,
    senders: Mutex<Vec<UnboundedSender<Result<StreamEvent>>>>,
}

impl ControlledBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, idx: usize) -> ChatRequest {
        self.requests.lock().unwrap()[idx].clone()
    }

    /// Feed an event to the most recent stream.
    pub fn push(&self, event: StreamEvent) {
        let senders = self.senders.lock().unwrap();
        if let Some(tx) = senders.last() {
            let _ = tx.unbounded_send(Ok(event));
        }
    }

    pub fn text(&self, text: &str) {
        self.push(StreamEvent::TextDelta(text.to_string()));
    }

    pub fn finish(&self) {
        self.push(StreamEvent::FinishMessage {
            finish_reason: Some("stop".to_string()),
            usage: Some(chatloop::Usage::new(10, 20)),
        });
    }

    pub fn fail(&self, message: &str) {
        self.push(StreamEvent::Error(message.to_string()));
    }
}

#[async_trait::async_trait]
impl CompletionBackend for ControlledBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream> {
        let (tx, rx) = unbounded();
        self.requests.lock().unwrap().push(request);
        self.senders.lock().unwrap().push(tx);
        Ok(Box::pin(rx))
    }
}

/// Template backend with a fixed answer.
pub struct FixedTemplates {
    pub selection: Result<TemplateSelection>,
    pub seed: Result<TemplateSeed>,
}

impl FixedTemplates {
    pub fn selecting(template: &str) -> Arc<Self> {
        Arc::new(Self {
            selection: Ok(TemplateSelection {
                template: template.to_string(),
                title: "Todo".to_string(),
            }),
            seed: Ok(TemplateSeed {
                assistant_message: "Here is the starter project.".to_string(),
                user_message: "Now build on the starter.".to_string(),
            }),
        })
    }

    pub fn failing(err: Error) -> Arc<Self> {
        Arc::new(Self {
            selection: Err(err.clone()),
            seed: Err(err),
        })
    }
}

#[async_trait::async_trait]
impl TemplateBackend for FixedTemplates {
    async fn select_template(&self, _: &TemplateRequest) -> Result<TemplateSelection> {
        self.selection.clone()
    }

    async fn fetch_template(&self, _: &str, _: &str) -> Result<TemplateSeed> {
        self.seed.clone()
    }
}

/// Template backend that never answers.
pub struct HangingTemplates;

#[async_trait::async_trait]
impl TemplateBackend for HangingTemplates {
    async fn select_template(&self, _: &TemplateRequest) -> Result<TemplateSelection> {
        futures::future::pending().await
    }

    async fn fetch_template(&self, _: &str, _: &str) -> Result<TemplateSeed> {
        futures::future::pending().await
    }
}

/// Validator that replays queued reports.
#[derive(Default)]
pub struct QueuedValidator {
    reports: Mutex<VecDeque<ValidationReport>>,
    pub seen: Mutex<Vec<Option<String>>>,
}

impl QueuedValidator {
    pub fn new(reports: Vec<ValidationReport>) -> Arc<Self> {
        Arc::new(Self {
            reports: Mutex::new(reports.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ValidationBackend for QueuedValidator {
    async fn validate(&self, file_name: Option<&str>) -> Result<ValidationReport> {
        self.seen.lock().unwrap().push(file_name.map(str::to_string));
        self.reports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::unavailable(503, "no report queued", None))
    }
}

/// Workspace that tracks calls.
#[derive(Default)]
pub struct RecordingWorkspace {
    pub modified: Mutex<BTreeMap<String, String>>,
    pub resets: Mutex<usize>,
    pub aborts: Mutex<usize>,
}

#[async_trait::async_trait]
impl Workspace for RecordingWorkspace {
    fn modified_files(&self) -> BTreeMap<String, String> {
        self.modified.lock().unwrap().clone()
    }

    fn reset_file_modifications(&self) {
        self.modified.lock().unwrap().clear();
        *self.resets.lock().unwrap() += 1;
    }

    fn abort_all_actions(&self) {
        *self.aborts.lock().unwrap() += 1;
    }

    async fn export(&self) -> Result<Option<String>> {
        Ok(Some("project.zip".to_string()))
    }
}

/// History store that keeps every snapshot.
#[derive(Default)]
pub struct RecordingHistory {
    pub snapshots: Mutex<Vec<Vec<Message>>>,
}

impl HistoryStore for RecordingHistory {
    fn store_message_history(&self, messages: &[Message]) -> Result<()> {
        self.snapshots.lock().unwrap().push(messages.to_vec());
        Ok(())
    }
}

/// Navigator that records resets.
#[derive(Default)]
pub struct RecordingNavigator {
    pub resets: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn reset(&self, location: &str) {
        self.resets.lock().unwrap().push(location.to_string());
    }
}

/// Poll `condition` until it holds, failing after a generous bound.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held");
}
