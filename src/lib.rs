// Public modules
pub mod backend;
pub mod channel;
pub mod client;
pub mod conversation;
pub mod data_stream;
pub mod error;
pub mod host;
pub mod kv;
pub mod mailbox;
pub mod parser;
pub mod pipeline;
pub mod prompt_library;
pub mod render;
pub mod sampler;
pub mod session;
pub mod streaming;
pub mod template;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use backend::{CompletionBackend, EventStream, TemplateBackend, ValidationBackend};
pub use channel::{CommandChannel, CommandTarget, ExternalSendOptions, TickOutcome};
pub use client::HttpBackend;
pub use error::{Error, Result};
pub use host::{HistoryStore, Navigator, TranscriptStore, Workspace};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use mailbox::{HttpMailbox, Mailbox, SlotMailbox};
pub use observability::register_biometrics;
pub use pipeline::{PipelineOutcome, PostTurnHook, PostTurnPipeline, TurnResult};
pub use render::{PlainTextRenderer, Renderer};
pub use sampler::Sampler;
pub use session::{SendOutcome, SendRequest, Session, SessionBuilder, SessionConfig, SessionPhase};
pub use types::*;
