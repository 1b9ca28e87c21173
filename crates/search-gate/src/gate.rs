//! Lease gate implementation
//!
//! Timekeeping uses `tokio::time::Instant` so the whole gate runs under
//! the test-util paused clock. The handle is a cheap clone over shared
//! state; watchdog and spacing timers are spawned tasks holding their own
//! clone.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use collect_core_types::LeaseId;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{GateConfig, Permit};

struct Waiter {
    id: u64,
    caller: String,
    tx: oneshot::Sender<Permit>,
}

struct Holder {
    lease: LeaseId,
    caller: String,
    /// Queue entry that received this lease; `None` for fast-path grants.
    waiter_id: Option<u64>,
    expires_at: Instant,
}

#[derive(Default)]
struct GateState {
    holder: Option<Holder>,
    last_release: Option<Instant>,
    queue: VecDeque<Waiter>,
    next_waiter: u64,
    timer_armed: bool,
}

struct Inner {
    config: GateConfig,
    state: Mutex<GateState>,
}

enum PumpAction {
    Idle,
    Again,
    ArmTimer(Instant),
}

/// Single-lease admission gate with FIFO waiters and spaced grants.
/// Clones share one gate.
#[derive(Clone)]
pub struct SearchGate {
    inner: Arc<Inner>,
}

impl SearchGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Wait up to `timeout` for the exclusive lease.
    ///
    /// `timeout == 0` performs exactly one eligibility check. A caller
    /// whose timeout elapses is removed from the queue; a grant that
    /// raced with the timeout is revoked before the denial is returned,
    /// so a timed-out caller never holds the lease.
    pub async fn wait_for_permit(&self, caller: &str, timeout: Duration) -> Permit {
        let deadline = Instant::now() + timeout;
        let (waiter_id, rx) = {
            let mut st = self.inner.state.lock();
            let now = Instant::now();
            self.reap_expired(&mut st, now);
            if st.queue.is_empty() && self.eligible(&st, now) {
                return self.grant_locked(&mut st, caller, None);
            }
            if timeout.is_zero() {
                return Permit::denied(self.denial_reason(&st));
            }
            let id = st.next_waiter;
            st.next_waiter += 1;
            let (tx, rx) = oneshot::channel();
            st.queue.push_back(Waiter {
                id,
                caller: caller.to_string(),
                tx,
            });
            (id, rx)
        };
        self.pump();

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(permit)) => {
                if Instant::now() > deadline {
                    // Grant landed in the channel after our deadline; give
                    // it back rather than deliver a late grant.
                    if let Some(lease) = &permit.lease_id {
                        self.revoke(lease);
                    }
                    return Permit::denied("timed out waiting for search permit");
                }
                permit
            }
            Ok(Err(_closed)) => Permit::denied("gate dropped the request"),
            Err(_elapsed) => {
                let stale_grant = {
                    let mut st = self.inner.state.lock();
                    if let Some(pos) = st.queue.iter().position(|w| w.id == waiter_id) {
                        st.queue.remove(pos);
                        None
                    } else {
                        st.holder
                            .as_ref()
                            .filter(|h| h.waiter_id == Some(waiter_id))
                            .map(|h| h.lease.clone())
                    }
                };
                if let Some(lease) = stale_grant {
                    self.revoke(&lease);
                }
                debug!(caller, "permit wait timed out");
                Permit::denied("timed out waiting for search permit")
            }
        }
    }

    /// Release a held lease when the scarce action has completed. Stale
    /// lease ids (already expired or revoked) are ignored.
    pub fn release(&self, lease: &LeaseId) {
        let released = {
            let mut st = self.inner.state.lock();
            let held = st.holder.as_ref().map_or(false, |h| h.lease == *lease);
            if held {
                st.holder = None;
                st.last_release = Some(Instant::now());
            }
            held
        };
        if released {
            debug!(lease = %lease, "lease released");
            self.pump();
        } else {
            debug!(lease = %lease, "release of stale lease ignored");
        }
    }

    /// Number of callers currently queued. Diagnostic only.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether a lease is currently held. Diagnostic only.
    pub fn held(&self) -> bool {
        self.inner.state.lock().holder.is_some()
    }

    fn eligible(&self, st: &GateState, now: Instant) -> bool {
        st.holder.is_none()
            && st
                .last_release
                .map_or(true, |t| now.duration_since(t) >= self.inner.config.min_interval)
    }

    fn denial_reason(&self, st: &GateState) -> String {
        match &st.holder {
            Some(holder) => format!("search lease held by '{}'", holder.caller),
            None => "minimum search interval has not yet elapsed".to_string(),
        }
    }

    /// Clear a holder whose hard expiry passed but whose watchdog has not
    /// fired yet. Keeps `timeout == 0` answers accurate.
    fn reap_expired(&self, st: &mut GateState, now: Instant) {
        let expired = st.holder.as_ref().map_or(false, |h| h.expires_at <= now);
        if expired {
            if let Some(holder) = st.holder.take() {
                warn!(lease = %holder.lease, caller = %holder.caller, "lease expired without release");
            }
            st.last_release = Some(now);
        }
    }

    fn grant_locked(&self, st: &mut GateState, caller: &str, waiter_id: Option<u64>) -> Permit {
        let lease = LeaseId::new();
        let expires_at = Instant::now() + self.inner.config.max_hold;
        st.holder = Some(Holder {
            lease: lease.clone(),
            caller: caller.to_string(),
            waiter_id,
            expires_at,
        });
        debug!(caller, lease = %lease, "lease granted");

        let gate = self.clone();
        let watched = lease.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            gate.expire(&watched);
        });

        Permit::granted(lease, expires_at)
    }

    /// Revoke a grant that was never used (timed-out receiver). Does not
    /// update `last_release`: the scarce action never ran, so the next
    /// grant owes no spacing to this one.
    fn revoke(&self, lease: &LeaseId) {
        let revoked = {
            let mut st = self.inner.state.lock();
            let held = st.holder.as_ref().map_or(false, |h| h.lease == *lease);
            if held {
                st.holder = None;
            }
            held
        };
        if revoked {
            debug!(lease = %lease, "unclaimed lease revoked");
            self.pump();
        }
    }

    fn expire(&self, lease: &LeaseId) {
        let expired = {
            let mut st = self.inner.state.lock();
            let now = Instant::now();
            let held = st.holder.as_ref().map_or(false, |h| h.lease == *lease);
            if held {
                if let Some(holder) = st.holder.take() {
                    warn!(lease = %holder.lease, caller = %holder.caller, "lease hit hard expiry");
                }
                st.last_release = Some(now);
            }
            held
        };
        if expired {
            self.pump();
        }
    }

    /// Move the gate forward: grant the next waiter if eligible, or arm a
    /// timer for the moment the minimum interval elapses.
    fn pump(&self) {
        loop {
            let action = {
                let mut st = self.inner.state.lock();
                let now = Instant::now();
                self.reap_expired(&mut st, now);
                if st.holder.is_some() || st.queue.is_empty() {
                    PumpAction::Idle
                } else if self.eligible(&st, now) {
                    match st.queue.pop_front() {
                        Some(waiter) => {
                            let permit = self.grant_locked(&mut st, &waiter.caller, Some(waiter.id));
                            if waiter.tx.send(permit).is_err() {
                                // Receiver already gave up; pass the lease on.
                                st.holder = None;
                                PumpAction::Again
                            } else {
                                PumpAction::Idle
                            }
                        }
                        None => PumpAction::Idle,
                    }
                } else {
                    match (st.timer_armed, st.last_release) {
                        (false, Some(last)) => {
                            st.timer_armed = true;
                            PumpAction::ArmTimer(last + self.inner.config.min_interval)
                        }
                        _ => PumpAction::Idle,
                    }
                }
            };

            match action {
                PumpAction::Again => continue,
                PumpAction::Idle => return,
                PumpAction::ArmTimer(at) => {
                    let gate = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep_until(at).await;
                        gate.inner.state.lock().timer_armed = false;
                        gate.pump();
                    });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate(min_interval_ms: u64, max_hold_ms: u64) -> SearchGate {
        SearchGate::new(GateConfig {
            min_interval: Duration::from_millis(min_interval_ms),
            max_hold: Duration::from_millis(max_hold_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn grants_are_mutually_exclusive_and_spaced() {
        let gate = gate(10_000, 60_000);
        let active = Arc::new(AtomicUsize::new(0));
        let grant_times = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate = gate.clone();
            let active = Arc::clone(&active);
            let grant_times = Arc::clone(&grant_times);
            handles.push(tokio::spawn(async move {
                let permit = gate
                    .wait_for_permit(&format!("worker-{i}"), Duration::from_secs(300))
                    .await;
                assert!(permit.granted, "worker {i} should eventually be granted");
                let overlapping = active.fetch_add(1, Ordering::SeqCst);
                assert_eq!(overlapping, 0, "two leases held at once");
                grant_times.lock().push(Instant::now());

                // Hold the lease across the critical section.
                tokio::time::sleep(Duration::from_secs(1)).await;

                active.fetch_sub(1, Ordering::SeqCst);
                gate.release(permit.lease_id.as_ref().unwrap());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let times = grant_times.lock();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            let spacing = pair[1].duration_since(pair[0]);
            assert!(
                spacing >= Duration::from_secs(10),
                "grants only {spacing:?} apart"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_on_held_lease_denies_immediately() {
        let gate = gate(1_000, 60_000);
        let permit = gate.wait_for_permit("holder", Duration::ZERO).await;
        assert!(permit.granted);

        let denied = gate.wait_for_permit("impatient", Duration::ZERO).await;
        assert!(!denied.granted);
        assert!(denied.reason.as_deref().unwrap().contains("holder"));
        assert_eq!(gate.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_during_spacing_window_denies() {
        let gate = gate(10_000, 60_000);
        let permit = gate.wait_for_permit("first", Duration::ZERO).await;
        gate.release(permit.lease_id.as_ref().unwrap());

        let denied = gate.wait_for_permit("second", Duration::ZERO).await;
        assert!(!denied.granted);
        assert!(denied
            .reason
            .as_deref()
            .unwrap()
            .contains("minimum search interval"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_waiter_never_receives_a_grant() {
        let gate = gate(0, 60_000);
        let first = gate.wait_for_permit("holder", Duration::ZERO).await;
        assert!(first.granted);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(
                async move { gate.wait_for_permit("slowpoke", Duration::from_secs(1)).await },
            )
        };

        // Hold well past the waiter's deadline, then release.
        tokio::time::sleep(Duration::from_secs(2)).await;
        gate.release(first.lease_id.as_ref().unwrap());

        let permit = waiter.await.unwrap();
        assert!(!permit.granted);
        assert_eq!(gate.queued(), 0);

        // The lease freed by the timed-out waiter is available to others.
        let next = gate.wait_for_permit("fresh", Duration::from_secs(5)).await;
        assert!(next.granted);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_holder_lease_expires() {
        let gate = gate(0, 5_000);
        let lost = gate.wait_for_permit("crasher", Duration::ZERO).await;
        assert!(lost.granted);
        // The holder never releases.

        let permit = gate.wait_for_permit("survivor", Duration::from_secs(30)).await;
        assert!(permit.granted, "expiry should free the lease");

        // A release with the dead lease id is ignored.
        gate.release(lost.lease_id.as_ref().unwrap());
        assert!(gate.held(), "stale release must not clear the new lease");
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_fifo() {
        let gate = gate(0, 60_000);
        let first = gate.wait_for_permit("holder", Duration::ZERO).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for name in ["b", "c", "d"] {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let permit = gate.wait_for_permit(name, Duration::from_secs(60)).await;
                assert!(permit.granted);
                order.lock().push(name);
                gate.release(permit.lease_id.as_ref().unwrap());
            }));
            // Let the waiter enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        gate.release(first.lease_id.as_ref().unwrap());
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec!["b", "c", "d"]);
    }
}
