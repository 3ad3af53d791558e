// Public modules
pub mod chat_request;
pub mod external_command;
pub mod message;
pub mod provider;
pub mod stream_event;
pub mod template;
pub mod usage;
pub mod validation;

// Re-exports
pub use chat_request::{ChatRequest, SupabaseConnection, SupabaseCredentials};
pub use external_command::{ExternalCommand, MailboxEnvelope};
pub use message::{ContentPart, HIDDEN_ANNOTATION, Message, Role};
pub use provider::{DEFAULT_MODEL, DEFAULT_PROVIDER, ProviderInfo, default_provider_list};
pub use stream_event::StreamEvent;
pub use template::{BLANK_TEMPLATE, TemplateRequest, TemplateSeed, TemplateSelection};
pub use usage::Usage;
pub use validation::{ValidationReport, ValidationStatus};
