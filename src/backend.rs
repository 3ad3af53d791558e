//! Traits for the remote services the session consumes.
//!
//! [`HttpBackend`](crate::HttpBackend) implements all of them over HTTP; tests
//! and embedders can substitute their own.

use std::pin::Pin;

use futures::Stream;

use crate::Result;
use crate::types::{
    ChatRequest, StreamEvent, TemplateRequest, TemplateSeed, TemplateSelection, ValidationReport,
};

/// A boxed stream of decoded completion frames.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The streaming chat completion endpoint.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streamed completion for the given request.
    ///
    /// Errors returned here happen before any frame was received; errors in the
    /// middle of a response arrive as items of the stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<EventStream>;
}

/// The starter-template classifier and seed store.
#[async_trait::async_trait]
pub trait TemplateBackend: Send + Sync {
    /// Classify a first message into a template identifier or blank.
    async fn select_template(&self, request: &TemplateRequest) -> Result<TemplateSelection>;

    /// Fetch the seed conversation for a non-blank template.
    async fn fetch_template(&self, template: &str, title: &str) -> Result<TemplateSeed>;
}

/// The endpoint that judges an exported project.
#[async_trait::async_trait]
pub trait ValidationBackend: Send + Sync {
    /// Validate the export identified by `file_name`.
    async fn validate(&self, file_name: Option<&str>) -> Result<ValidationReport>;
}
