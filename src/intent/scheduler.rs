//! Fixed-interval polling scheduler.
//!
//! Owns at most one recurring status-check task per payment intent. Each
//! tick awaits the check callback before sleeping again, so checks are
//! never re-entrant. Stopping is idempotent; a stopped session lets an
//! in-flight check finish, but its result is discarded by the caller's
//! state guard.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

/// Directive returned by a status check: keep polling or end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Boxed future produced by a check callback.
pub type CheckFuture = Pin<Box<dyn Future<Output = TickFlow> + Send>>;

/// Status-check callback invoked on every tick.
pub type CheckFn = Arc<dyn Fn() -> CheckFuture + Send + Sync>;

/// Opaque handle to one polling session.
///
/// Handles carry the session epoch, so a stale handle (one whose session
/// has since been replaced by a new `start` for the same intent) cannot
/// stop the replacement.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    intent_id: String,
    epoch: u64,
}

impl SessionHandle {
    pub fn intent_id(&self) -> &str {
        &self.intent_id
    }
}

struct ActiveSession {
    epoch: u64,
    cancel_tx: watch::Sender<bool>,
}

type SessionRegistry = Mutex<HashMap<String, ActiveSession>>;

/// A poisoned registry lock only means a panic in another session task; the
/// map itself is still consistent, so keep serving.
fn lock_registry(registry: &SessionRegistry) -> MutexGuard<'_, HashMap<String, ActiveSession>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns all live polling sessions, keyed by intent id.
pub struct PollingScheduler {
    sessions: Arc<SessionRegistry>,
    next_epoch: AtomicU64,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Start polling `check` every `interval` for the given intent.
    ///
    /// The first tick fires one interval after `start`. Any existing
    /// session for the same intent is cancelled and replaced.
    pub fn start(&self, intent_id: &str, check: CheckFn, interval: Duration) -> SessionHandle {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        {
            let mut sessions = lock_registry(&self.sessions);
            let previous = sessions.insert(
                intent_id.to_string(),
                ActiveSession {
                    epoch,
                    cancel_tx,
                },
            );
            if let Some(previous) = previous {
                let _ = previous.cancel_tx.send(true);
                info!(intent_id, "replacing existing polling session");
            }
        }

        let sessions = Arc::clone(&self.sessions);
        let id = intent_id.to_string();
        tokio::spawn(async move {
            debug!(
                intent_id = %id,
                interval_ms = interval.as_millis() as u64,
                "polling session started"
            );
            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        // A dropped sender counts as cancellation too.
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                if *cancel_rx.borrow() {
                    break;
                }
                let flow = check().await;
                // A stop requested while the check was in flight wins; the
                // caller has already discarded the check's result.
                if *cancel_rx.borrow() || flow == TickFlow::Stop {
                    break;
                }
            }

            // Unregister, unless a replacement session took over the slot.
            let mut sessions = lock_registry(&sessions);
            if sessions.get(&id).map(|s| s.epoch) == Some(epoch) {
                sessions.remove(&id);
            }
            debug!(intent_id = %id, "polling session ended");
        });

        SessionHandle {
            intent_id: intent_id.to_string(),
            epoch,
        }
    }

    /// Stop a session. Idempotent: stopping twice, or after the session
    /// already ended on its own, is a no-op.
    pub fn stop(&self, handle: &SessionHandle) {
        let mut sessions = lock_registry(&self.sessions);
        let is_current = sessions
            .get(&handle.intent_id)
            .map(|s| s.epoch == handle.epoch)
            .unwrap_or(false);
        if is_current {
            if let Some(session) = sessions.remove(&handle.intent_id) {
                let _ = session.cancel_tx.send(true);
                info!(intent_id = %handle.intent_id, "polling session stopped");
            }
        }
    }

    /// Number of currently registered sessions.
    pub fn active_sessions(&self) -> usize {
        lock_registry(&self.sessions).len()
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn counting_check(counter: Arc<AtomicUsize>) -> CheckFn {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                TickFlow::Continue
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_fire_on_cadence() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.start("pi_1", counting_check(Arc::clone(&ticks)), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.active_sessions(), 1);

        scheduler.stop(&handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_ticks() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.start("pi_1", counting_check(Arc::clone(&ticks)), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        scheduler.stop(&handle);
        scheduler.stop(&handle);
        assert_eq!(scheduler.active_sessions(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_stop_unregisters_session() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let check: CheckFn = {
            let ticks = Arc::clone(&ticks);
            Arc::new(move || {
                let ticks = Arc::clone(&ticks);
                Box::pin(async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    TickFlow::Stop
                })
            })
        };
        scheduler.start("pi_1", check, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_session_and_stale_handle_is_inert() {
        let scheduler = PollingScheduler::new();
        let first_ticks = Arc::new(AtomicUsize::new(0));
        let second_ticks = Arc::new(AtomicUsize::new(0));

        let stale = scheduler.start(
            "pi_1",
            counting_check(Arc::clone(&first_ticks)),
            Duration::from_secs(1),
        );
        let _current = scheduler.start(
            "pi_1",
            counting_check(Arc::clone(&second_ticks)),
            Duration::from_secs(1),
        );
        assert_eq!(scheduler.active_sessions(), 1);

        // The stale handle must not stop the replacement session.
        scheduler.stop(&stale);
        assert_eq!(scheduler.active_sessions(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(first_ticks.load(Ordering::SeqCst), 0);
        assert_eq!(second_ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_in_flight_check_prevents_next_tick() {
        let scheduler = PollingScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let check: CheckFn = {
            let ticks = Arc::clone(&ticks);
            let gate = Arc::clone(&gate);
            Arc::new(move || {
                let ticks = Arc::clone(&ticks);
                let gate = Arc::clone(&gate);
                Box::pin(async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    gate.notified().await;
                    TickFlow::Continue
                })
            })
        };
        let handle = scheduler.start("pi_1", check, Duration::from_secs(1));

        // Let the first tick start and park inside the check.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        // Stop while the check is in flight, then release it.
        scheduler.stop(&handle);
        gate.notify_one();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_sessions(), 0);
    }
}
