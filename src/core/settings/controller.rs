//! Debounced settings controller
//!
//! A [`SettingsController`] owns one [`SettingsGroup`] and persists it to the
//! group's namespace. `schedule_write` coalesces any number of save requests
//! into a single flush that happens once no request arrived for the
//! configured delay.
//!
//! # Pending writer
//!
//! The scheduled deadline lives in one `AtomicU64` (absolute clock time in
//! microseconds, `0` = nothing pending). `schedule_write` swaps in a new
//! deadline; only the call that swaps out `0` spawns the pending-writer task,
//! so at most one task exists per controller.
//!
//! ```text
//!            schedule_write (deadline was 0)
//!   Idle ─────────────────────────────────────▶ Armed ◀──┐
//!    ▲                                           │        │ deadline moved
//!    │ deadline cleared                 now >= deadline   │ during flush
//!    │                                           ▼        │
//!    └────────────────────────────────────── Flushing ───┘
//! ```
//!
//! While a write is pending the deadline only moves forward: a request that
//! lands on the same microsecond as the current deadline bumps it by one.
//! After a flush the task clears the deadline with
//! `compare_exchange(observed, 0)`, so any request made during the flush
//! makes the exchange fail and the task arms again for the new deadline.

use super::config::{WriteFailurePolicy, WriterConfig};
use super::stream::PersistenceStream;
use crate::core::fatal::abort_on;
use crate::core::traits::TimeSource;
use crate::platform::{KeyValueStore, Result, StorageError, TaskSpawner, TaskSpec};
use nvs_settings_core::validate_name;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One logical group of settings stored under a single namespace
pub trait SettingsGroup: Send + 'static {
    /// Namespace holding this group's keys
    fn namespace(&self) -> &'static str;

    /// Load fields from `stream`, keeping defaults for absent keys
    fn on_read(&mut self, stream: &PersistenceStream<'_>);

    /// Stage every field into `stream`
    fn on_write(&self, stream: &PersistenceStream<'_>) -> Result<()>;
}

/// Pending-writer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriterPhase {
    /// No write pending, no task
    Idle,
    /// Task waiting for the deadline
    Armed,
    /// Task writing the group
    Flushing,
}

/// Pending-writer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// `schedule_write` calls
    pub schedule_requests: u64,
    /// Pending-writer tasks started
    pub tasks_spawned: u64,
    /// Successful scheduled flushes
    pub flushes: u64,
    /// Failed scheduled flushes
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    schedule_requests: AtomicU64,
    tasks_spawned: AtomicU64,
    flushes: AtomicU64,
    failures: AtomicU64,
}

/// Owner of one settings group with debounced persistence
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use nvs_settings::core::settings::{SettingsController, WriterConfig};
/// use nvs_settings::core::storage::FlashKvStore;
/// use nvs_settings::platform::host::{MonotonicClock, ThreadSpawner};
/// use nvs_settings::platform::mock::MockFlash;
/// use nvs_settings::platform::traits::StoragePartition;
/// use nvs_settings::settings::DisplaySettings;
///
/// let store = Arc::new(FlashKvStore::new(MockFlash::new()));
/// store.init().unwrap();
///
/// let display = SettingsController::new(
///     DisplaySettings::default(),
///     store,
///     Arc::new(MonotonicClock::new()),
///     Arc::new(ThreadSpawner::new()),
///     WriterConfig::default().with_delay(Duration::from_millis(20)),
/// )
/// .unwrap();
///
/// display.read().unwrap();
/// display.update_and_schedule(|d| d.brightness = 80).unwrap();
/// assert!(display.wait_idle(Duration::from_secs(5)));
/// assert_eq!(display.stats().flushes, 1);
/// ```
pub struct SettingsController<G: SettingsGroup> {
    namespace: &'static str,
    group: Mutex<G>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn TimeSource>,
    spawner: Arc<dyn TaskSpawner>,
    config: WriterConfig,
    deadline_us: AtomicU64,
    flushing: AtomicBool,
    idle_lock: Mutex<()>,
    idle: Condvar,
    counters: Counters,
}

impl<G: SettingsGroup> SettingsController<G> {
    /// Create a controller for `group`
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the group's namespace is not a valid name.
    pub fn new(
        group: G,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn TimeSource>,
        spawner: Arc<dyn TaskSpawner>,
        config: WriterConfig,
    ) -> Result<Arc<Self>> {
        let namespace = group.namespace();
        validate_name(namespace)?;

        Ok(Arc::new(Self {
            namespace,
            group: Mutex::new(group),
            store,
            clock,
            spawner,
            config,
            deadline_us: AtomicU64::new(0),
            flushing: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
            counters: Counters::default(),
        }))
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Lock the in-memory group
    pub fn lock(&self) -> MutexGuard<'_, G> {
        self.group.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the in-memory group
    pub fn update<R>(&self, f: impl FnOnce(&mut G) -> R) -> R {
        f(&mut *self.lock())
    }

    /// Mutate the in-memory group, then schedule a write
    pub fn update_and_schedule<R>(self: &Arc<Self>, f: impl FnOnce(&mut G) -> R) -> Result<R> {
        let result = self.update(f);
        self.schedule_write()?;
        Ok(result)
    }

    /// Load the group from storage
    ///
    /// A namespace that was never written leaves the group at its defaults.
    pub fn read(&self) -> Result<()> {
        let stream = PersistenceStream::open_for_reading(self.store.as_ref(), self.namespace)?;
        self.lock().on_read(&stream);
        stream.close();
        Ok(())
    }

    /// Persist the group now
    pub fn write(&self) -> Result<()> {
        let group = self.lock();
        let stream = PersistenceStream::open_for_writing(self.store.as_ref(), self.namespace)?;
        group.on_write(&stream)?;
        stream.commit()?;
        stream.close();
        crate::log_debug!("Wrote settings {}", self.namespace);
        Ok(())
    }

    /// Request a write after the configured delay
    ///
    /// Every call moves the deadline to `now + delay`, and always at least
    /// one microsecond past a deadline already pending. The first call after
    /// idle starts the pending-writer task; later calls only move the
    /// deadline it is waiting for.
    ///
    /// # Errors
    ///
    /// Returns `SpawnFailed` if the task could not be started; nothing is
    /// pending afterwards.
    pub fn schedule_write(self: &Arc<Self>) -> Result<()> {
        self.counters.schedule_requests.fetch_add(1, Ordering::Relaxed);

        let target = self
            .clock
            .now_us()
            .saturating_add(self.config.delay_us())
            .max(1);
        // Every request must change a pending deadline, or a flush in
        // progress could clear it without seeing the request
        let previous = match self.deadline_us.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| match current {
                0 => Some(target),
                pending => Some(target.max(pending.saturating_add(1))),
            },
        ) {
            Ok(previous) | Err(previous) => previous,
        };
        if previous != 0 {
            crate::log_trace!("Settings {} write postponed", self.namespace);
            return Ok(());
        }

        let spec = TaskSpec {
            name: self.config.task_name,
            stack_size: self.config.stack_size,
            priority: self.config.priority,
        };
        let controller = Arc::clone(self);
        match self
            .spawner
            .spawn(&spec, Box::new(move || controller.run_pending_writer()))
        {
            Ok(()) => {
                self.counters.tasks_spawned.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.deadline_us.store(0, Ordering::SeqCst);
                self.notify_idle();
                crate::log_error!("Cannot start writer for {}: {}", self.namespace, e);
                Err(e)
            }
        }
    }

    /// Current pending-writer state
    pub fn phase(&self) -> WriterPhase {
        if self.deadline_us.load(Ordering::SeqCst) == 0 {
            WriterPhase::Idle
        } else if self.flushing.load(Ordering::SeqCst) {
            WriterPhase::Flushing
        } else {
            WriterPhase::Armed
        }
    }

    pub fn is_write_pending(&self) -> bool {
        self.phase() != WriterPhase::Idle
    }

    /// Block until no write is pending
    ///
    /// Returns `false` if `timeout` elapsed first. This is not a join: the
    /// pending-writer task may still be returning when this wakes, so a
    /// `schedule_write` right after can briefly overlap two tasks. Only the
    /// new one ever flushes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, result) = self
            .idle
            .wait_timeout_while(guard, timeout, |_| {
                self.deadline_us.load(Ordering::SeqCst) != 0
            })
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            schedule_requests: self.counters.schedule_requests.load(Ordering::Relaxed),
            tasks_spawned: self.counters.tasks_spawned.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn notify_idle(&self) {
        let _guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.idle.notify_all();
    }

    fn run_pending_writer(&self) {
        loop {
            let observed = self.deadline_us.load(Ordering::SeqCst);
            if observed == 0 {
                break;
            }

            let now = self.clock.now_us();
            if now < observed {
                self.clock.sleep_us(observed - now);
                continue;
            }

            self.flushing.store(true, Ordering::SeqCst);
            let result = self.write();
            self.flushing.store(false, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.on_flush_failure(e),
            }

            if self
                .deadline_us
                .compare_exchange(observed, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
            crate::log_debug!("Settings {} changed during flush, rearming", self.namespace);
        }

        self.notify_idle();
    }

    fn on_flush_failure(&self, error: StorageError) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        match self.config.failure_policy {
            WriteFailurePolicy::Abort => abort_on(self.namespace, error),
            WriteFailurePolicy::LogAndContinue => {
                crate::log_error!("Scheduled write of {} failed: {}", self.namespace, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::FlashKvStore;
    use crate::core::traits::MockTime;
    use crate::platform::mock::{MockFlash, RecordingSpawner};
    use crate::platform::{FlashError, StoragePartition};
    use std::sync::mpsc;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(5);
    const MS: u64 = 1_000;

    /// Hooks letting a test hold the writer inside `on_write`
    struct Gate {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    #[derive(Default)]
    struct Counter {
        value: u32,
        label: String,
        gate: Option<Gate>,
    }

    impl SettingsGroup for Counter {
        fn namespace(&self) -> &'static str {
            "counter"
        }

        fn on_read(&mut self, stream: &PersistenceStream<'_>) {
            self.value = stream.get("value", 0u32);
            self.label = stream.get_string("label", "none");
        }

        fn on_write(&self, stream: &PersistenceStream<'_>) -> Result<()> {
            if let Some(gate) = &self.gate {
                let _ = gate.entered.send(());
                let _ = gate.release.recv();
            }
            stream.set("value", self.value)?;
            stream.set_string("label", &self.label)
        }
    }

    struct Fixture {
        flash: MockFlash,
        store: Arc<FlashKvStore<MockFlash>>,
        clock: MockTime,
        spawner: RecordingSpawner,
        controller: Arc<SettingsController<Counter>>,
    }

    fn fixture_with(group: Counter) -> Fixture {
        fixture_with_delay(group, Duration::from_millis(2500))
    }

    fn fixture_with_delay(group: Counter, delay: Duration) -> Fixture {
        let flash = MockFlash::new();
        let store = Arc::new(FlashKvStore::new(flash.clone()));
        store.init().unwrap();
        let clock = MockTime::new();
        let spawner = RecordingSpawner::new();
        let config = WriterConfig::default()
            .with_delay(delay)
            .with_failure_policy(WriteFailurePolicy::LogAndContinue);

        let controller = SettingsController::new(
            group,
            store.clone(),
            Arc::new(clock.clone()),
            Arc::new(spawner.clone()),
            config,
        )
        .unwrap();

        Fixture {
            flash,
            store,
            clock,
            spawner,
            controller,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Counter::default())
    }

    fn stored_value(store: &FlashKvStore<MockFlash>) -> u32 {
        let stream = PersistenceStream::open_for_reading(store, "counter").unwrap();
        stream.get("value", 0u32)
    }

    struct BadName;

    impl SettingsGroup for BadName {
        fn namespace(&self) -> &'static str {
            "namespace_way_too_long"
        }

        fn on_read(&mut self, _stream: &PersistenceStream<'_>) {}

        fn on_write(&self, _stream: &PersistenceStream<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let store = Arc::new(FlashKvStore::new(MockFlash::new()));
        let result = SettingsController::new(
            BadName,
            store,
            Arc::new(MockTime::new()),
            Arc::new(RecordingSpawner::new()),
            WriterConfig::default(),
        );
        assert_eq!(result.err(), Some(StorageError::InvalidName));
    }

    #[test]
    fn test_read_never_written_namespace() {
        let f = fixture();
        f.controller.update(|g| g.value = 9);
        f.controller.read().unwrap();

        let group = f.controller.lock();
        assert_eq!(group.value, 0);
        assert_eq!(group.label, "none");
    }

    #[test]
    fn test_write_then_read() {
        let f = fixture();
        f.controller.update(|g| {
            g.value = 42;
            g.label = "saved".into();
        });
        f.controller.write().unwrap();

        f.controller.update(|g| g.value = 0);
        f.controller.read().unwrap();
        assert_eq!(f.controller.lock().value, 42);
        assert_eq!(f.controller.lock().label, "saved");
    }

    #[test]
    fn test_read_is_idempotent() {
        let f = fixture();
        f.controller.update(|g| g.value = 5);
        f.controller.write().unwrap();
        let writes = f.flash.get_write_count();

        f.controller.read().unwrap();
        f.controller.read().unwrap();
        assert_eq!(f.controller.lock().value, 5);
        assert_eq!(f.flash.get_write_count(), writes);
    }

    #[test]
    fn test_coalesced_flush_after_last_request() {
        let f = fixture();
        f.controller.update(|g| g.value = 1);

        f.controller.schedule_write().unwrap();
        assert_eq!(f.controller.phase(), WriterPhase::Armed);

        f.clock.set(1_000 * MS);
        f.controller.update_and_schedule(|g| g.value = 2).unwrap();
        f.clock.set(2_000 * MS);
        f.controller.update_and_schedule(|g| g.value = 3).unwrap();

        f.clock.set(4_499 * MS);
        assert!(f.clock.wait_for_sleepers(1, WAIT));
        assert_eq!(f.controller.stats().flushes, 0);
        assert!(f.controller.is_write_pending());
        assert_eq!(f.flash.get_write_count(), 0);

        f.clock.set(4_500 * MS);
        assert!(f.controller.wait_idle(WAIT));

        let stats = f.controller.stats();
        assert_eq!(stats.schedule_requests, 3);
        assert_eq!(stats.tasks_spawned, 1);
        assert_eq!(stats.flushes, 1);
        assert_eq!(f.spawner.spawned(), 1);
        assert_eq!(f.flash.get_write_count(), 1);
        assert_eq!(stored_value(&f.store), 3);
    }

    #[test]
    fn test_task_spec_from_config() {
        let f = fixture();
        f.controller.schedule_write().unwrap();

        let spec = f.spawner.specs()[0];
        assert_eq!(spec.name, f.controller.config().task_name);
        assert_eq!(spec.stack_size, f.controller.config().stack_size);
        assert_eq!(spec.priority, f.controller.config().priority);

        f.clock.set(2_500 * MS);
        assert!(f.controller.wait_idle(WAIT));
    }

    #[test]
    fn test_single_task_under_concurrent_requests() {
        let f = fixture();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&f.controller);
                thread::spawn(move || {
                    for _ in 0..50 {
                        controller.schedule_write().unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(f.spawner.spawned(), 1);
        assert_eq!(f.spawner.peak(), 1);
        assert_eq!(f.controller.stats().schedule_requests, 400);

        f.clock.set(2_500 * MS);
        assert!(f.controller.wait_idle(WAIT));
        assert_eq!(f.controller.stats().flushes, 1);
    }

    #[test]
    fn test_fresh_task_after_idle() {
        let f = fixture();

        f.controller.update_and_schedule(|g| g.value = 1).unwrap();
        f.clock.set(2_500 * MS);
        assert!(f.controller.wait_idle(WAIT));
        assert_eq!(f.controller.phase(), WriterPhase::Idle);

        f.controller.update_and_schedule(|g| g.value = 2).unwrap();
        f.clock.set(5_000 * MS);
        assert!(f.controller.wait_idle(WAIT));

        assert_eq!(f.spawner.spawned(), 2);
        assert_eq!(f.controller.stats().flushes, 2);
        assert_eq!(stored_value(&f.store), 2);
    }

    #[test]
    fn test_request_during_flush_rearms_same_task() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let f = fixture_with(Counter {
            gate: Some(Gate {
                entered: entered_tx,
                release: release_rx,
            }),
            ..Counter::default()
        });

        f.controller.update_and_schedule(|g| g.value = 1).unwrap();
        f.clock.set(2_500 * MS);
        entered_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(f.controller.phase(), WriterPhase::Flushing);

        // New request while the first flush is in progress
        f.controller.schedule_write().unwrap();
        release_tx.send(()).unwrap();

        assert!(f.clock.wait_for_sleepers(1, WAIT));
        assert_eq!(f.controller.phase(), WriterPhase::Armed);
        assert_eq!(f.controller.stats().flushes, 1);

        f.clock.set(5_000 * MS);
        entered_rx.recv_timeout(WAIT).unwrap();
        release_tx.send(()).unwrap();
        assert!(f.controller.wait_idle(WAIT));

        assert_eq!(f.spawner.spawned(), 1);
        assert_eq!(f.controller.stats().flushes, 2);
    }

    #[test]
    fn test_request_on_same_deadline_during_flush_is_kept() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let f = fixture_with_delay(
            Counter {
                gate: Some(Gate {
                    entered: entered_tx,
                    release: release_rx,
                }),
                ..Counter::default()
            },
            Duration::ZERO,
        );

        // Deadline 1 at t=0
        f.controller.update_and_schedule(|g| g.value = 1).unwrap();
        f.clock.set(1);
        entered_rx.recv_timeout(WAIT).unwrap();

        // Same clock reading, so `now + delay` equals the deadline in flight
        f.controller.schedule_write().unwrap();
        release_tx.send(()).unwrap();

        assert!(f.clock.wait_for_sleepers(1, WAIT));
        assert_eq!(f.controller.phase(), WriterPhase::Armed);

        f.clock.set(2);
        entered_rx.recv_timeout(WAIT).unwrap();
        release_tx.send(()).unwrap();
        assert!(f.controller.wait_idle(WAIT));

        assert_eq!(f.controller.stats().flushes, 2);
        assert_eq!(f.controller.stats().schedule_requests, 2);
        assert_eq!(f.spawner.spawned(), 1);
        assert_eq!(stored_value(&f.store), 1);
    }

    #[test]
    fn test_pending_deadline_only_moves_forward() {
        let f = fixture_with_delay(Counter::default(), Duration::ZERO);

        f.controller.schedule_write().unwrap();
        f.controller.schedule_write().unwrap();
        f.controller.schedule_write().unwrap();

        // Three requests at t=0, nothing written yet
        assert_eq!(f.controller.deadline_us.load(Ordering::SeqCst), 3);
        f.clock.set(3);
        assert!(f.controller.wait_idle(WAIT));
        assert_eq!(f.controller.stats().flushes, 1);
        assert_eq!(f.spawner.spawned(), 1);
    }

    #[test]
    fn test_writer_task_returns_after_idle() {
        let f = fixture();

        for round in 1..=3u32 {
            f.controller.update_and_schedule(|g| g.value = round).unwrap();
            f.clock.advance(2_500 * MS);
            assert!(f.controller.wait_idle(WAIT));

            // Idle can be reported before the task has returned
            let start = std::time::Instant::now();
            while f.spawner.finished() < round as usize {
                assert!(start.elapsed() < WAIT, "writer task never returned");
                thread::yield_now();
            }
            assert_eq!(f.spawner.live(), 0);
        }

        assert_eq!(f.spawner.spawned(), 3);
        assert_eq!(f.spawner.peak(), 1);
        assert_eq!(f.controller.stats().flushes, 3);
        assert_eq!(stored_value(&f.store), 3);
    }

    #[test]
    fn test_spawn_failure_leaves_idle() {
        let f = fixture();
        f.spawner.fail_next_spawn();

        assert_eq!(
            f.controller.schedule_write(),
            Err(StorageError::SpawnFailed)
        );
        assert_eq!(f.controller.phase(), WriterPhase::Idle);
        assert!(f.controller.wait_idle(Duration::ZERO));

        f.controller.schedule_write().unwrap();
        assert_eq!(f.controller.phase(), WriterPhase::Armed);
        f.clock.set(2_500 * MS);
        assert!(f.controller.wait_idle(WAIT));
        assert_eq!(f.controller.stats().tasks_spawned, 1);
    }

    #[test]
    fn test_failed_flush_counted_and_cleared() {
        let f = fixture();
        f.controller.update_and_schedule(|g| g.value = 7).unwrap();

        f.flash.fail_next_write();
        f.clock.set(2_500 * MS);
        assert!(f.controller.wait_idle(WAIT));

        let stats = f.controller.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.flushes, 0);
        assert!(!PersistenceStream::open_for_reading(f.store.as_ref(), "counter")
            .unwrap()
            .has_data());

        // Next request starts over
        f.controller.schedule_write().unwrap();
        f.clock.set(5_000 * MS);
        assert!(f.controller.wait_idle(WAIT));
        assert_eq!(f.controller.stats().flushes, 1);
        assert_eq!(stored_value(&f.store), 7);
    }

    #[test]
    fn test_write_error_is_returned() {
        let f = fixture();
        f.flash.fail_next_erase();
        assert_eq!(
            f.controller.write(),
            Err(StorageError::Flash(FlashError::EraseFailed))
        );
        assert_eq!(f.controller.phase(), WriterPhase::Idle);
    }

    #[test]
    fn test_wait_idle_without_pending_write() {
        let f = fixture();
        assert!(f.controller.wait_idle(Duration::ZERO));
        assert!(!f.controller.is_write_pending());
    }
}
