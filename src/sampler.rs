//! Trailing-edge throttle for expensive side effects.
//!
//! A [`Sampler`] wraps a handler and a minimum interval. Calls record their
//! arguments; the handler runs once per interval with the arguments of the most
//! recent call. The first call of a quiet period never runs the handler
//! immediately.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::observability::SAMPLER_INVOCATIONS;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

struct SamplerState<T> {
    pending: Option<T>,
    scheduled: bool,
    last_run: Option<Instant>,
}

struct SamplerInner<T> {
    interval: Duration,
    handler: Handler<T>,
    runtime: Option<Handle>,
    state: Mutex<SamplerState<T>>,
}

impl<T> SamplerInner<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, SamplerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, args: T) {
        SAMPLER_INVOCATIONS.click();
        (self.handler)(args);
    }
}

/// A trailing-only throttle.
///
/// Cloning produces another handle to the same sampler. The trailing run is a
/// timer on the runtime that was current when the sampler was created, so
/// `call` may come from any thread.
pub struct Sampler<T> {
    inner: Arc<SamplerInner<T>>,
}

impl<T> Clone for Sampler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Sampler<T> {
    /// Create a sampler that runs `handler` at most once per `interval`.
    pub fn new(interval: Duration, handler: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(SamplerInner {
                interval,
                handler: Arc::new(handler),
                runtime: Handle::try_current().ok(),
                state: Mutex::new(SamplerState {
                    pending: None,
                    scheduled: false,
                    last_run: None,
                }),
            }),
        }
    }

    /// The minimum interval between two handler runs.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Record `args` and make sure a trailing run is scheduled.
    ///
    /// Without a runtime the arguments wait for the next [`Sampler::flush`].
    pub fn call(&self, args: T) {
        let runtime = {
            let mut state = self.inner.lock();
            state.pending = Some(args);
            if state.scheduled {
                return;
            }
            let Some(runtime) = self
                .inner
                .runtime
                .clone()
                .or_else(|| Handle::try_current().ok())
            else {
                return;
            };
            state.scheduled = true;
            runtime
        };

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let mut deadline = Instant::now() + inner.interval;
            loop {
                tokio::time::sleep_until(deadline).await;
                let args = {
                    let mut state = inner.lock();
                    // A flush since the timer was armed pushes the run back.
                    let earliest = state.last_run.map(|last| last + inner.interval);
                    if let Some(earliest) = earliest.filter(|earliest| *earliest > deadline) {
                        deadline = earliest;
                        continue;
                    }
                    state.scheduled = false;
                    let args = state.pending.take();
                    if args.is_some() {
                        state.last_run = Some(deadline);
                    }
                    args
                };
                if let Some(args) = args {
                    inner.run(args);
                }
                return;
            }
        });
    }

    /// Run the handler now with the pending arguments, if any.
    ///
    /// Returns true if the handler ran. A trailing run that is already armed
    /// waits a full interval from the flush before it fires again.
    pub fn flush(&self) -> bool {
        let args = {
            let mut state = self.inner.lock();
            let args = state.pending.take();
            if args.is_some() {
                state.last_run = Some(Instant::now());
            }
            args
        };
        match args {
            Some(args) => {
                self.inner.run(args);
                true
            }
            None => false,
        }
    }

    /// Returns true if a call is waiting for its trailing run.
    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}
