//! Configuration for a session.
//!
//! Values come from three layers applied in order: built-in defaults, an
//! optional YAML [`ConfigFile`], and command-line [`SessionArgs`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::types::{DEFAULT_MODEL, ProviderInfo, SupabaseConnection, default_provider_list};
use crate::{Error, Result};

/// Default prompt variant.
pub const DEFAULT_PROMPT_ID: &str = "default";

/// Where a navigation reset sends the host.
pub const DEFAULT_RESET_LOCATION: &str = "http://localhost:5173";

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_POST_TURN_DELAY: Duration = Duration::from_secs(20);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_DRAFT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_COOKIE_EXPIRY_DAYS: u32 = 30;

/// Command-line arguments for the chatloop tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct SessionArgs {
    /// Base URL of the chat server.
    #[arrrg(optional, "Chat server base URL (default: http://localhost:5173/)", "URL")]
    pub base_url: Option<String>,

    /// Mailbox endpoint to poll for external commands.
    #[arrrg(optional, "External command mailbox URL", "URL")]
    pub mailbox_url: Option<String>,

    /// Validation endpoint used after each turn.
    #[arrrg(optional, "Validation endpoint URL", "URL")]
    pub validation_url: Option<String>,

    /// Model to start with.
    #[arrrg(optional, "Model to use", "MODEL")]
    pub model: Option<String>,

    /// Provider to start with.
    #[arrrg(optional, "Provider to use", "PROVIDER")]
    pub provider: Option<String>,

    /// Prompt variant id.
    #[arrrg(optional, "Prompt variant (default, enhanced, optimized)", "ID")]
    pub prompt: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Transcript file to restore from and persist to.
    #[arrrg(optional, "Transcript file for message history", "PATH")]
    pub transcript: Option<String>,

    /// Key-value store file.
    #[arrrg(optional, "Key-value store file for selections and drafts", "PATH")]
    pub kv_store: Option<String>,

    /// Skip starter template selection.
    #[arrrg(flag, "Disable starter template selection")]
    pub no_template: bool,

    /// Disable ANSI colors.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Do not poll the mailbox.
    #[arrrg(flag, "Disable external command polling")]
    pub no_poll: bool,
}

/// Optional YAML overlay for [`SessionConfig`].
///
/// Durations are given in milliseconds.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Chat server base URL.
    pub base_url: Option<String>,
    /// External command mailbox URL.
    pub mailbox_url: Option<String>,
    /// Validation endpoint URL.
    pub validation_url: Option<String>,
    /// Starting model.
    pub model: Option<String>,
    /// Starting provider name.
    pub provider: Option<String>,
    /// Provider names a restored selection may name.
    pub providers: Option<Vec<String>>,
    /// Prompt variant id.
    pub prompt_id: Option<String>,
    /// Classify the first message into a starter template.
    pub auto_select_template: Option<bool>,
    /// Let the backend trim context.
    pub context_optimization: Option<bool>,
    /// Per-provider API keys.
    pub api_keys: Option<BTreeMap<String, String>>,
    /// External storage connection info.
    pub supabase: Option<SupabaseConnection>,
    pub sample_interval_ms: Option<u64>,
    pub post_turn_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub draft_interval_ms: Option<u64>,
    /// Where a navigation reset sends the host.
    pub reset_location: Option<String>,
    /// Expiry for values saved to the key-value store.
    pub cookie_expiry_days: Option<u32>,
}

impl ConfigFile {
    /// Read a configuration file.
    pub fn load(path: &str) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| Error::io(format!("failed to open config file {path}"), err))?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    /// Overlay the fields that are set onto `config`.
    pub fn apply(self, mut config: SessionConfig) -> SessionConfig {
        if let Some(url) = self.base_url {
            config.base_url = Some(url);
        }
        if let Some(url) = self.mailbox_url {
            config.mailbox_url = Some(url);
        }
        if let Some(url) = self.validation_url {
            config.validation_url = Some(url);
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(providers) = self.providers {
            config.provider_list = providers.into_iter().map(ProviderInfo::named).collect();
        }
        if let Some(provider) = self.provider {
            config.provider = ProviderInfo::named(provider);
        }
        if let Some(prompt_id) = self.prompt_id {
            config.prompt_id = prompt_id;
        }
        if let Some(enabled) = self.auto_select_template {
            config.auto_select_template = enabled;
        }
        if let Some(enabled) = self.context_optimization {
            config.context_optimization = enabled;
        }
        if let Some(api_keys) = self.api_keys {
            config.api_keys = api_keys;
        }
        if let Some(supabase) = self.supabase {
            config.supabase = supabase;
        }
        let millis = Duration::from_millis;
        if let Some(ms) = self.sample_interval_ms {
            config.sample_interval = millis(ms);
        }
        if let Some(ms) = self.post_turn_delay_ms {
            config.post_turn_delay = millis(ms);
        }
        if let Some(ms) = self.settle_delay_ms {
            config.settle_delay = millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = millis(ms);
        }
        if let Some(ms) = self.draft_interval_ms {
            config.draft_interval = millis(ms);
        }
        if let Some(location) = self.reset_location {
            config.reset_location = location;
        }
        if let Some(days) = self.cookie_expiry_days {
            config.cookie_expiry_days = days;
        }
        config
    }
}

/// Configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Model used until the user picks another.
    pub model: String,

    /// Provider used until the user picks another.
    pub provider: ProviderInfo,

    /// Providers a restored selection may name.
    pub provider_list: Vec<ProviderInfo>,

    /// Classify the first message into a starter template.
    pub auto_select_template: bool,

    /// Active prompt variant.
    pub prompt_id: String,

    /// Let the backend trim context.
    pub context_optimization: bool,

    /// External storage connection info forwarded with requests.
    pub supabase: SupabaseConnection,

    /// Per-provider API keys; entries loaded from the key-value store win.
    pub api_keys: BTreeMap<String, String>,

    /// Throttle interval for parsing and persistence.
    pub sample_interval: Duration,

    /// Wait between a completed turn and the post-turn pipeline.
    pub post_turn_delay: Duration,

    /// Wait between applying external overrides and sending.
    pub settle_delay: Duration,

    /// Mailbox poll period.
    pub poll_interval: Duration,

    /// Throttle interval for saving the draft input.
    pub draft_interval: Duration,

    /// Where a navigation reset sends the host.
    pub reset_location: String,

    /// Expiry for values saved to the key-value store.
    pub cookie_expiry_days: u32,

    /// Chat server base URL; `None` uses the backend default.
    pub base_url: Option<String>,

    /// External command mailbox URL; `None` keeps the mailbox in process.
    pub mailbox_url: Option<String>,

    /// Validation endpoint; `None` derives it from the base URL.
    pub validation_url: Option<String>,

    /// Whether to poll the mailbox at all.
    pub poll_mailbox: bool,

    /// Transcript file for history persistence.
    pub transcript_path: Option<String>,

    /// Key-value store file.
    pub kv_store_path: Option<String>,

    /// Whether to use ANSI colors.
    pub use_color: bool,
}

impl SessionConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - Template selection: enabled
    /// - Prompt: default
    /// - Sampling: 50 ms; drafts: 1 s
    /// - Post-turn delay: 20 s; settle delay: 100 ms
    /// - Mailbox poll: every 2 s
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider: ProviderInfo::default(),
            provider_list: default_provider_list(),
            auto_select_template: true,
            prompt_id: DEFAULT_PROMPT_ID.to_string(),
            context_optimization: false,
            supabase: SupabaseConnection::default(),
            api_keys: BTreeMap::new(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            post_turn_delay: DEFAULT_POST_TURN_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            draft_interval: DEFAULT_DRAFT_INTERVAL,
            reset_location: DEFAULT_RESET_LOCATION.to_string(),
            cookie_expiry_days: DEFAULT_COOKIE_EXPIRY_DAYS,
            base_url: None,
            mailbox_url: None,
            validation_url: None,
            poll_mailbox: true,
            transcript_path: None,
            kv_store_path: None,
            use_color: true,
        }
    }

    /// Resolve command-line arguments, reading `--config` if given.
    pub fn from_args(args: SessionArgs) -> Result<Self> {
        let mut config = Self::new();
        if let Some(path) = args.config.as_deref() {
            config = ConfigFile::load(path)?.apply(config);
        }
        if args.base_url.is_some() {
            config.base_url = args.base_url;
        }
        if args.mailbox_url.is_some() {
            config.mailbox_url = args.mailbox_url;
        }
        if args.validation_url.is_some() {
            config.validation_url = args.validation_url;
        }
        if let Some(model) = args.model {
            config.model = model;
        }
        if let Some(provider) = args.provider {
            config.provider = ProviderInfo::named(provider);
        }
        if let Some(prompt) = args.prompt {
            config.prompt_id = prompt;
        }
        if args.transcript.is_some() {
            config.transcript_path = args.transcript;
        }
        if args.kv_store.is_some() {
            config.kv_store_path = args.kv_store;
        }
        if args.no_template {
            config.auto_select_template = false;
        }
        if args.no_color {
            config.use_color = false;
        }
        if args.no_poll {
            config.poll_mailbox = false;
        }
        Ok(config)
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the provider.
    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the providers a restored selection may name.
    pub fn with_provider_list(mut self, providers: Vec<ProviderInfo>) -> Self {
        self.provider_list = providers;
        self
    }

    /// Enables or disables starter template selection.
    pub fn with_auto_select_template(mut self, enabled: bool) -> Self {
        self.auto_select_template = enabled;
        self
    }

    /// Sets the prompt variant.
    pub fn with_prompt_id(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = prompt_id.into();
        self
    }

    /// Enables or disables context optimization.
    pub fn with_context_optimization(mut self, enabled: bool) -> Self {
        self.context_optimization = enabled;
        self
    }

    /// Sets the external storage connection.
    pub fn with_supabase(mut self, supabase: SupabaseConnection) -> Self {
        self.supabase = supabase;
        self
    }

    /// Sets an API key for `provider`.
    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }

    /// Sets the sampling interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Sets the post-turn delay.
    pub fn with_post_turn_delay(mut self, delay: Duration) -> Self {
        self.post_turn_delay = delay;
        self
    }

    /// Sets the settle delay for external sends.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the mailbox poll period.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the draft throttle interval.
    pub fn with_draft_interval(mut self, interval: Duration) -> Self {
        self.draft_interval = interval;
        self
    }

    /// Sets the navigation reset location.
    pub fn with_reset_location(mut self, location: impl Into<String>) -> Self {
        self.reset_location = location.into();
        self
    }

    /// Sets the key-value expiry.
    pub fn with_cookie_expiry_days(mut self, days: u32) -> Self {
        self.cookie_expiry_days = days;
        self
    }

    /// Enables or disables ANSI colors.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Look up a configured provider by name.
    pub fn find_provider(&self, name: &str) -> Option<&ProviderInfo> {
        self.provider_list.iter().find(|p| p.name == name)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::new();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.provider, ProviderInfo::default());
        assert!(config.auto_select_template);
        assert_eq!(config.prompt_id, "default");
        assert!(!config.context_optimization);
        assert_eq!(config.sample_interval, Duration::from_millis(50));
        assert_eq!(config.post_turn_delay, Duration::from_secs(20));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.draft_interval, Duration::from_secs(1));
        assert_eq!(config.reset_location, "http://localhost:5173");
        assert_eq!(config.cookie_expiry_days, 30);
        assert!(config.poll_mailbox);
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = SessionConfig::from_args(SessionArgs::default()).unwrap();
        assert_eq!(config, SessionConfig::new());
    }

    #[test]
    fn config_from_args_overrides() {
        let args = SessionArgs {
            model: Some("gpt-x".to_string()),
            provider: Some("OpenAI".to_string()),
            prompt: Some("optimized".to_string()),
            mailbox_url: Some("http://localhost:5173/api/external-send".to_string()),
            no_template: true,
            no_color: true,
            no_poll: true,
            ..SessionArgs::default()
        };
        let config = SessionConfig::from_args(args).unwrap();
        assert_eq!(config.model, "gpt-x");
        assert_eq!(config.provider, ProviderInfo::named("OpenAI"));
        assert_eq!(config.prompt_id, "optimized");
        assert!(!config.auto_select_template);
        assert!(!config.use_color);
        assert!(!config.poll_mailbox);
        assert!(config.mailbox_url.is_some());
    }

    #[test]
    fn yaml_overlay() {
        let file: ConfigFile = serde_yaml::from_str(
            "model: gpt-x\nprovider: OpenAI\npost_turn_delay_ms: 500\nauto_select_template: false\napi_keys:\n  OpenAI: sk-test\n",
        )
        .unwrap();
        let config = file.apply(SessionConfig::new());
        assert_eq!(config.model, "gpt-x");
        assert_eq!(config.provider.name, "OpenAI");
        assert_eq!(config.post_turn_delay, Duration::from_millis(500));
        assert!(!config.auto_select_template);
        assert_eq!(config.api_keys.get("OpenAI").map(String::as_str), Some("sk-test"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        assert!(serde_yaml::from_str::<ConfigFile>("modle: typo\n").is_err());
    }

    #[test]
    fn missing_config_file_is_io_error() {
        let args = SessionArgs {
            config: Some("/nonexistent/chatloop.yaml".to_string()),
            ..SessionArgs::default()
        };
        assert!(SessionConfig::from_args(args).is_err());
    }

    #[test]
    fn builders() {
        let config = SessionConfig::new()
            .with_model("m")
            .with_provider(ProviderInfo::named("Groq"))
            .with_auto_select_template(false)
            .with_api_key("Groq", "k")
            .with_settle_delay(Duration::ZERO);
        assert_eq!(config.model, "m");
        assert_eq!(config.find_provider("Groq"), Some(&ProviderInfo::named("Groq")));
        assert_eq!(config.find_provider("Nope"), None);
        assert!(!config.auto_select_template);
        assert_eq!(config.settle_delay, Duration::ZERO);
    }
}
