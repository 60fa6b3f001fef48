//! Virtual user pool
//!
//! Each virtual user is a tokio task looping over the workload until it is
//! told to stop. Stopping is cooperative: a user always finishes the iteration
//! it is in, and only the pause between iterations is cut short.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::workload::Workload;

/// What a single [`VirtualUserPool::reconcile`] call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub spawned: usize,
    pub stopped: usize,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.spawned == 0 && self.stopped == 0
    }
}

/// Counters shared between the pool and its user tasks
#[derive(Debug, Default)]
pub struct PoolStats {
    active: AtomicUsize,
    iterations: AtomicU64,
}

impl PoolStats {
    /// User tasks that have not exited yet, including ones told to stop
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Completed workload iterations across all users
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }
}

/// Decrements the active gauge when a user task ends, however it ends.
struct ActiveGuard(Arc<PoolStats>);

impl ActiveGuard {
    fn new(stats: Arc<PoolStats>) -> Self {
        stats.active.fetch_add(1, Ordering::AcqRel);
        Self(stats)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

struct VirtualUser {
    id: u64,
    /// `true` once the user has been asked to stop
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Dynamically sized set of virtual users
pub struct VirtualUserPool {
    workload: Arc<dyn Workload>,
    sleep: Duration,
    /// Live users, oldest first
    users: Vec<VirtualUser>,
    /// Users told to stop that may still be finishing an iteration
    draining: Vec<JoinHandle<()>>,
    next_id: u64,
    peak_live: usize,
    stats: Arc<PoolStats>,
}

impl VirtualUserPool {
    pub fn new(workload: Arc<dyn Workload>, sleep: Duration) -> Self {
        Self {
            workload,
            sleep,
            users: Vec::new(),
            draining: Vec::new(),
            next_id: 0,
            peak_live: 0,
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Bring the number of live users to `target`.
    ///
    /// New users get increasing ids. Excess users are stopped newest first
    /// and stop counting as live immediately, even while they finish their
    /// current iteration.
    pub fn reconcile(&mut self, target: u64) -> ReconcileOutcome {
        self.reap();

        let target = usize::try_from(target).unwrap_or(usize::MAX);
        let live = self.users.len();
        let mut outcome = ReconcileOutcome::default();

        if live < target {
            for _ in live..target {
                self.spawn_user();
            }
            outcome.spawned = target - live;
            self.peak_live = self.peak_live.max(target);
        } else if live > target {
            let excess = self.users.split_off(target);
            outcome.stopped = excess.len();
            for user in excess.into_iter().rev() {
                user.stop.send_replace(true);
                self.draining.push(user.handle);
            }
        }

        outcome
    }

    fn spawn_user(&mut self) {
        self.next_id += 1;
        let id = self.next_id;
        let (stop, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_user(
            id,
            self.workload.clone(),
            self.sleep,
            stop_rx,
            ActiveGuard::new(self.stats.clone()),
        ));

        self.users.push(VirtualUser { id, stop, handle });
    }

    /// Forget users that have already exited.
    ///
    /// A live user only exits on its own if its workload panicked; it is
    /// dropped here so the next reconcile replaces it.
    pub fn reap(&mut self) {
        self.draining.retain(|handle| !handle.is_finished());

        let before = self.users.len();
        self.users.retain(|user| !user.handle.is_finished());
        let lost = before - self.users.len();
        if lost > 0 {
            warn!("{} virtual users exited unexpectedly", lost);
        }
    }

    /// Wait until every stopped user has finished its last iteration.
    pub async fn wait_drained(&mut self) {
        let handles = std::mem::take(&mut self.draining);
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("Virtual user task failed: {}", e);
            }
        }
    }

    /// Stop every user and wait for all of them to exit.
    pub async fn shutdown(&mut self) -> ReconcileOutcome {
        let outcome = self.reconcile(0);
        self.wait_drained().await;
        outcome
    }

    /// Users currently asked to run
    pub fn live_count(&self) -> usize {
        self.users.len()
    }

    /// Stopped users not yet collected
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    /// Ids of the live users, oldest first
    pub fn user_ids(&self) -> Vec<u64> {
        self.users.iter().map(|u| u.id).collect()
    }

    /// User tasks still running, including draining ones
    pub fn active_count(&self) -> usize {
        self.stats.active()
    }

    pub fn iterations(&self) -> u64 {
        self.stats.iterations()
    }

    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Users spawned over the pool's lifetime
    pub fn total_spawned(&self) -> u64 {
        self.next_id
    }

    /// Shared counters, for exporters that outlive a borrow of the pool
    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }
}

impl Drop for VirtualUserPool {
    fn drop(&mut self) {
        for user in &self.users {
            user.stop.send_replace(true);
        }
    }
}

async fn run_user(
    id: u64,
    workload: Arc<dyn Workload>,
    sleep: Duration,
    mut stop: watch::Receiver<bool>,
    active: ActiveGuard,
) {
    debug!(vu = id, "Virtual user started");

    while !*stop.borrow() {
        workload.execute(id).await;
        active.0.iterations.fetch_add(1, Ordering::Relaxed);

        if sleep.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = stop.changed() => break,
        }
    }

    debug!(vu = id, "Virtual user stopped");
}
