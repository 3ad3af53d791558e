use biometrics::{Collector, Counter, Moments};

pub(crate) static TURNS_STARTED: Counter = Counter::new("chatloop.session.turns_started");
pub(crate) static TURNS_COMPLETED: Counter = Counter::new("chatloop.session.turns_completed");
pub(crate) static TURNS_FAILED: Counter = Counter::new("chatloop.session.turns_failed");
pub(crate) static TURNS_ABORTED: Counter = Counter::new("chatloop.session.turns_aborted");
pub(crate) static TURN_DURATION: Moments = Moments::new("chatloop.session.turn_duration_seconds");
pub(crate) static ASSISTANT_MESSAGE_LENGTH: Moments =
    Moments::new("chatloop.session.assistant_message_length");

pub(crate) static STREAM_DELTAS: Counter = Counter::new("chatloop.stream.deltas");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatloop.stream.bytes");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatloop.stream.errors");
pub(crate) static PROMPT_TOKENS: Counter = Counter::new("chatloop.usage.prompt_tokens");
pub(crate) static COMPLETION_TOKENS: Counter = Counter::new("chatloop.usage.completion_tokens");

pub(crate) static TEMPLATE_SEEDS: Counter = Counter::new("chatloop.template.seeds");
pub(crate) static TEMPLATE_FALLBACKS: Counter = Counter::new("chatloop.template.fallbacks");

pub(crate) static MAILBOX_POLLS: Counter = Counter::new("chatloop.mailbox.polls");
pub(crate) static MAILBOX_COMMANDS: Counter = Counter::new("chatloop.mailbox.commands");
pub(crate) static MAILBOX_ERRORS: Counter = Counter::new("chatloop.mailbox.transport_errors");

pub(crate) static PIPELINE_VALIDATIONS: Counter = Counter::new("chatloop.pipeline.validations");
pub(crate) static PIPELINE_RESUBMISSIONS: Counter =
    Counter::new("chatloop.pipeline.resubmissions");

pub(crate) static SAMPLER_INVOCATIONS: Counter = Counter::new("chatloop.sampler.invocations");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TURNS_STARTED);
    collector.register_counter(&TURNS_COMPLETED);
    collector.register_counter(&TURNS_FAILED);
    collector.register_counter(&TURNS_ABORTED);
    collector.register_moments(&TURN_DURATION);
    collector.register_moments(&ASSISTANT_MESSAGE_LENGTH);

    collector.register_counter(&STREAM_DELTAS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&PROMPT_TOKENS);
    collector.register_counter(&COMPLETION_TOKENS);

    collector.register_counter(&TEMPLATE_SEEDS);
    collector.register_counter(&TEMPLATE_FALLBACKS);

    collector.register_counter(&MAILBOX_POLLS);
    collector.register_counter(&MAILBOX_COMMANDS);
    collector.register_counter(&MAILBOX_ERRORS);

    collector.register_counter(&PIPELINE_VALIDATIONS);
    collector.register_counter(&PIPELINE_RESUBMISSIONS);

    collector.register_counter(&SAMPLER_INVOCATIONS);
}
