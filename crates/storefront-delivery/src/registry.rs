//! Resource registry and bounded-concurrency loading queue

use crate::{
    BudgetMonitor, Clock, DeliveryConfig, DeliveryError, KindLoader, Payload, Priority,
    ResourceDescriptor, ResourceEntry, ResourceStatus, Result, RetryConfig, TokioClock,
    Transport,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum loads executing at once
    pub max_concurrent: usize,
    /// Per-attempt timeout
    pub fetch_timeout: Duration,
    /// Backoff schedule
    pub retry: RetryConfig,
    /// Loads slower than this are logged
    pub slow_resource_threshold: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RegistryConfig {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            fetch_timeout: config.fetch_timeout,
            retry: config.retry.clone(),
            slow_resource_threshold: config.slow_resource_threshold,
        }
    }
}

/// Delay before the retry that follows the `failures`-th consecutive failure:
/// `base_backoff * multiplier^failures`, capped at `max_backoff`.
pub fn backoff_delay(retry: &RetryConfig, failures: u32) -> Duration {
    let factor = retry.multiplier.powi(failures.min(i32::MAX as u32) as i32);
    let secs = (retry.base_backoff.as_secs_f64() * factor).min(retry.max_backoff.as_secs_f64());
    Duration::from_secs_f64(secs.max(0.0))
}

/// Aggregate snapshot over all registered entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStats {
    pub total: usize,
    pub loaded: usize,
    pub loading: usize,
    pub error: usize,
    pub pending: usize,
    /// Mean load duration over entries currently loaded
    pub average_load_time_ms: f64,
    /// Tasks waiting for a slot
    pub queued: usize,
    /// Tasks currently executing
    pub in_flight: usize,
}

type Responder = oneshot::Sender<Result<Payload>>;

/// Queued unit of work; one per entry at a time
#[derive(Debug)]
struct LoadingTask {
    entry_id: String,
    /// Failed attempts so far in this run
    failures: u32,
}

/// What an executing attempt was started against
#[derive(Debug, Clone)]
struct Dispatch {
    generation: u64,
    url: String,
    loader: KindLoader,
    max_retries: u32,
}

struct Slot {
    entry: ResourceEntry,
    loader: KindLoader,
    /// Callers awaiting a task, tagged with the generation they asked for
    waiters: Vec<(u64, Responder)>,
    /// A task for the current generation is queued, executing, or backing off
    outstanding: bool,
}

impl Slot {
    /// Resolve every caller waiting on `generation`
    fn respond(&mut self, generation: u64, outcome: &Result<Payload>) {
        let (ready, rest): (Vec<_>, Vec<_>) = self
            .waiters
            .drain(..)
            .partition(|(tag, _)| *tag == generation);
        self.waiters = rest;
        for (_, waiter) in ready {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Slot>,
    queue: VecDeque<LoadingTask>,
    in_flight: usize,
    /// Tasks sleeping before their next attempt, by ticket
    backing_off: HashMap<u64, LoadingTask>,
    timers: HashMap<u64, JoinHandle<()>>,
    next_ticket: u64,
    next_generation: u64,
    budget: Option<Arc<BudgetMonitor>>,
    shut_down: bool,
}

struct RegistryInner {
    config: RegistryConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
}

/// Registry of declared resources with a FIFO loading queue.
///
/// At most `max_concurrent` attempts execute at once. A failed attempt is
/// retried after exponential backoff, re-entering at the back of the queue,
/// until the descriptor's retry budget is spent. Concurrent `load` calls for
/// the same id share one task.
#[derive(Clone)]
pub struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    /// Create a registry on the tokio clock
    pub fn new(config: RegistryConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Arc::new(TokioClock))
    }

    /// Create a registry whose backoff and timestamps use `clock`
    pub fn with_clock(
        config: RegistryConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                transport,
                clock,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Feed successful loads into a budget monitor
    pub fn attach_budget(&self, monitor: Arc<BudgetMonitor>) {
        self.inner.lock().budget = Some(monitor);
    }

    /// Create or replace the entry for `id`; the new entry starts pending
    pub fn register(&self, id: impl Into<String>, descriptor: ResourceDescriptor) {
        let id = id.into();
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let generation = state.next_generation;
        state.next_generation += 1;

        let loader = KindLoader::for_kind(descriptor.kind);
        let entry = ResourceEntry::new(id.clone(), descriptor, generation);

        let replaced = match state.entries.get_mut(&id) {
            Some(slot) => {
                let previous = slot.entry.generation;
                slot.entry = entry;
                slot.loader = loader;
                Some(previous)
            }
            None => {
                state.entries.insert(
                    id.clone(),
                    Slot {
                        entry,
                        loader,
                        waiters: Vec::new(),
                        outstanding: false,
                    },
                );
                None
            }
        };

        if let Some(previous) = replaced {
            self.inner.retarget(state, &id, previous, generation);
        }
        debug!("Registered resource {}", id);
    }

    /// Register under the id derived from kind and URL, returning that id
    pub fn register_descriptor(&self, descriptor: ResourceDescriptor) -> String {
        let id = descriptor.id();
        self.register(id.clone(), descriptor);
        id
    }

    /// Register only if `id` is unknown or was registered with a different
    /// descriptor, so an existing payload survives repeated declarations
    pub fn ensure_registered(&self, descriptor: ResourceDescriptor) -> String {
        let id = descriptor.id();
        let unchanged = self
            .inner
            .lock()
            .entries
            .get(&id)
            .is_some_and(|slot| slot.entry.descriptor == descriptor);

        if !unchanged {
            self.register(id.clone(), descriptor);
        }
        id
    }

    /// Load a registered resource.
    ///
    /// A loaded entry within its TTL resolves immediately without touching the
    /// transport. Otherwise the call waits for the queued task, across retries.
    pub async fn load(&self, id: &str) -> Result<Payload> {
        let rx = {
            let mut guard = self.inner.lock();
            let state = &mut *guard;
            if state.shut_down {
                return Err(DeliveryError::ShutDown);
            }

            let now = self.inner.clock.now();
            let slot = state
                .entries
                .get_mut(id)
                .ok_or_else(|| DeliveryError::NotFound(id.to_string()))?;

            if slot.entry.is_fresh(now) {
                if let Some(data) = &slot.entry.data {
                    debug!("Resource {} served from registry", id);
                    return Ok(data.clone());
                }
            }

            let (tx, rx) = oneshot::channel();
            let generation = slot.entry.generation;
            slot.waiters.push((generation, tx));

            if !slot.outstanding {
                slot.outstanding = true;
                state.queue.push_back(LoadingTask {
                    entry_id: id.to_string(),
                    failures: 0,
                });
                self.inner.drain(state);
            }
            rx
        };

        rx.await.unwrap_or(Err(DeliveryError::ShutDown))
    }

    /// Register and load every critical descriptor in parallel, waiting for all.
    /// Each resource reports its own outcome.
    pub async fn preload_critical(
        &self,
        descriptors: impl IntoIterator<Item = ResourceDescriptor>,
    ) -> Vec<(String, Result<Payload>)> {
        let ids: Vec<String> = descriptors
            .into_iter()
            .filter(|d| d.priority == Priority::Critical)
            .map(|d| self.register_descriptor(d))
            .collect();

        let results = futures::future::join_all(ids.iter().map(|id| self.load(id))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Preloaded {} critical resources ({} failed)",
            results.len(),
            failed
        );

        ids.into_iter().zip(results).collect()
    }

    /// Snapshot of one entry
    pub fn entry(&self, id: &str) -> Option<ResourceEntry> {
        self.inner.lock().entries.get(id).map(|s| s.entry.clone())
    }

    /// Whether `id` has been registered
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    /// Aggregate statistics
    pub fn stats(&self) -> ResourceStats {
        let state = self.inner.lock();
        let mut stats = ResourceStats {
            total: state.entries.len(),
            queued: state.queue.len(),
            in_flight: state.in_flight,
            ..Default::default()
        };

        let mut total_load_ms = 0.0;
        for slot in state.entries.values() {
            match slot.entry.status {
                ResourceStatus::Pending => stats.pending += 1,
                ResourceStatus::Loading => stats.loading += 1,
                ResourceStatus::Error => stats.error += 1,
                ResourceStatus::Loaded => {
                    stats.loaded += 1;
                    total_load_ms += slot.entry.load_duration.as_secs_f64() * 1000.0;
                }
            }
        }
        if stats.loaded > 0 {
            stats.average_load_time_ms = total_load_ms / stats.loaded as f64;
        }
        stats
    }

    /// Reject queued and backing-off loads, cancel backoff timers, and refuse
    /// further loads. Attempts already executing run to completion.
    pub fn shutdown(&self) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.shut_down {
            return;
        }
        state.shut_down = true;

        for (_, timer) in state.timers.drain() {
            timer.abort();
        }

        let abandoned: Vec<LoadingTask> = state
            .queue
            .drain(..)
            .chain(state.backing_off.drain().map(|(_, task)| task))
            .collect();

        for task in &abandoned {
            if let Some(slot) = state.entries.get_mut(&task.entry_id) {
                slot.outstanding = false;
                let generation = slot.entry.generation;
                slot.respond(generation, &Err(DeliveryError::ShutDown));
            }
        }
        info!("Resource registry shut down ({} pending loads rejected)", abandoned.len());
    }
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start queued tasks while slots are free
    fn drain(self: &Arc<Self>, state: &mut RegistryState) {
        if state.shut_down {
            return;
        }

        while state.in_flight < self.config.max_concurrent {
            let Some(task) = state.queue.pop_front() else {
                break;
            };
            let Some(slot) = state.entries.get_mut(&task.entry_id) else {
                continue;
            };

            slot.entry.status = ResourceStatus::Loading;
            let dispatch = Dispatch {
                generation: slot.entry.generation,
                url: slot.entry.descriptor.url.clone(),
                loader: slot.loader,
                max_retries: slot
                    .entry
                    .descriptor
                    .max_retries
                    .unwrap_or(self.config.retry.max_retries),
            };
            state.in_flight += 1;

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.execute(task, dispatch).await;
            });
        }
    }

    /// Run one attempt under the fetch timeout
    async fn execute(self: Arc<Self>, task: LoadingTask, dispatch: Dispatch) {
        let started = self.clock.now();
        let attempt = dispatch
            .loader
            .attempt_load(self.transport.as_ref(), &dispatch.url);

        let outcome = match tokio::time::timeout(self.config.fetch_timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeliveryError::Timeout(
                self.config.fetch_timeout.as_millis() as u64,
            )),
        };
        let elapsed = self.clock.now().saturating_duration_since(started);

        self.complete(task, dispatch, outcome, elapsed);
    }

    fn complete(
        self: &Arc<Self>,
        mut task: LoadingTask,
        dispatch: Dispatch,
        outcome: Result<Payload>,
        elapsed: Duration,
    ) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.in_flight -= 1;

        let now = self.clock.now();
        let shut_down = state.shut_down;
        let budget = state.budget.clone();
        let mut retry = None;

        if let Some(slot) = state.entries.get_mut(&task.entry_id) {
            // Re-registered mid-flight: this attempt answers only its own callers.
            let current = slot.entry.generation == dispatch.generation;

            match outcome {
                Ok(payload) => {
                    if current {
                        let entry = &mut slot.entry;
                        entry.status = ResourceStatus::Loaded;
                        entry.data = Some(payload.clone());
                        entry.load_duration = elapsed;
                        entry.last_loaded_at = Some(now);
                        entry.error_count = 0;
                        slot.outstanding = false;
                    }

                    if elapsed > self.config.slow_resource_threshold {
                        warn!(
                            "Slow resource: {} ({:.2}ms)",
                            task.entry_id,
                            elapsed.as_secs_f64() * 1000.0
                        );
                    }
                    if let Some(budget) = &budget {
                        budget.track_kind(payload.kind(), payload.size());
                    }

                    slot.respond(dispatch.generation, &Ok(payload));
                }
                Err(error) => {
                    task.failures += 1;
                    if current {
                        slot.entry.status = ResourceStatus::Error;
                        slot.entry.error_count += 1;
                    }

                    let retryable = error.is_transient() && current && !shut_down;
                    if retryable && task.failures < dispatch.max_retries {
                        let delay = self.retry_delay(task.failures);
                        warn!(
                            "Retrying resource {} (attempt {}) in {:?}: {}",
                            task.entry_id, task.failures, delay, error
                        );
                        retry = Some((task, delay));
                    } else {
                        warn!("Failed to load resource {}: {}", task.entry_id, error);
                        if current {
                            slot.outstanding = false;
                        }
                        slot.respond(dispatch.generation, &Err(error));
                    }
                }
            }
        }

        if let Some((task, delay)) = retry {
            self.schedule_retry(state, task, delay);
        }
        self.drain(state);
    }

    /// Rebind work for `id` after re-registration.
    ///
    /// A queued or backing-off task has no attempt running, so it moves to the
    /// new generation with a fresh retry budget and its callers follow it. An
    /// executing attempt keeps its callers; the next `load` starts a new task.
    fn retarget(
        self: &Arc<Self>,
        state: &mut RegistryState,
        id: &str,
        previous: u64,
        generation: u64,
    ) {
        let mut pending = false;
        for task in state.queue.iter_mut().filter(|t| t.entry_id == id) {
            task.failures = 0;
            pending = true;
        }

        let parked: Vec<u64> = state
            .backing_off
            .iter()
            .filter(|(_, task)| task.entry_id == id)
            .map(|(ticket, _)| *ticket)
            .collect();
        for ticket in parked {
            if let Some(timer) = state.timers.remove(&ticket) {
                timer.abort();
            }
            if let Some(mut task) = state.backing_off.remove(&ticket) {
                task.failures = 0;
                state.queue.push_back(task);
                pending = true;
            }
        }

        if let Some(slot) = state.entries.get_mut(id) {
            if pending {
                for (tag, _) in slot.waiters.iter_mut().filter(|(tag, _)| *tag == previous) {
                    *tag = generation;
                }
            } else {
                slot.outstanding = false;
            }
        }

        if pending {
            debug!("Retargeted pending load of {} to its new descriptor", id);
            self.drain(state);
        }
    }

    fn retry_delay(&self, failures: u32) -> Duration {
        let delay = backoff_delay(&self.config.retry, failures);
        if self.config.retry.jitter {
            delay.mul_f64(1.0 + rand::random::<f64>() * self.config.retry.jitter_ratio)
        } else {
            delay
        }
    }

    /// Park `task` until `delay` has passed, then append it to the queue
    fn schedule_retry(self: &Arc<Self>, state: &mut RegistryState, task: LoadingTask, delay: Duration) {
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let inner = Arc::clone(self);
        let timer = tokio::spawn(async move {
            inner.clock.sleep(delay).await;

            let mut guard = inner.lock();
            let state = &mut *guard;
            state.timers.remove(&ticket);
            if let Some(task) = state.backing_off.remove(&ticket) {
                state.queue.push_back(task);
                inner.drain(state);
            }
        });

        state.backing_off.insert(ticket, task);
        state.timers.insert(ticket, timer);
    }
}
