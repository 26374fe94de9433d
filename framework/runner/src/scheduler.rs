use crate::stages::StagePlan;
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Lifecycle of a single VU. Transitions only ever move forward, and the VU itself only acts on them
/// between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VuState {
    Running,
    /// Asked to stop once the current iteration is complete.
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct VuLifecycle {
    state: Arc<watch::Sender<VuState>>,
}

impl Default for VuLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl VuLifecycle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::channel(VuState::Running).0),
        }
    }

    pub fn state(&self) -> VuState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == VuState::Running
    }

    pub(crate) fn drain(&self) {
        self.state.send_if_modified(|state| {
            if *state == VuState::Running {
                *state = VuState::Draining;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn stop(&self) {
        self.state.send_replace(VuState::Stopped);
    }

    /// Resolves once the VU has been asked to drain, or has stopped.
    pub(crate) async fn wait_for_drain(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver.wait_for(|state| *state != VuState::Running).await;
    }
}

/// Concurrency as seen by the scheduler on its most recent tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerState {
    /// Concurrency the stage plan asked for.
    pub desired: usize,
    /// VUs that are running iterations and will start another.
    pub running: usize,
    /// VUs finishing their current iteration before they stop.
    pub draining: usize,
    pub started_total: usize,
    pub stopped_total: usize,
    /// Highest value of `running` seen so far.
    pub peak: usize,
}

impl SchedulerState {
    /// VUs whose threads have not finished yet.
    pub fn alive(&self) -> usize {
        self.running + self.draining
    }
}

/// Read-only view of the scheduler's state. Only the scheduler publishes to it.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    state: Arc<RwLock<SchedulerState>>,
}

impl ConcurrencyGauge {
    pub fn snapshot(&self) -> SchedulerState {
        *self.state.read()
    }

    fn publish(&self, state: SchedulerState) {
        *self.state.write() = state;
    }
}

struct VuHandle {
    vu: usize,
    lifecycle: VuLifecycle,
    thread: JoinHandle<()>,
}

/// Starts and drains VUs so that the number running follows the [StagePlan].
pub(crate) struct StageScheduler {
    plan: StagePlan,
    vus: Vec<VuHandle>,
    next_vu: usize,
    state: SchedulerState,
    gauge: ConcurrencyGauge,
    admitting: bool,
}

impl StageScheduler {
    pub(crate) fn new(plan: StagePlan, gauge: ConcurrencyGauge) -> Self {
        Self {
            plan,
            vus: Vec::new(),
            next_vu: 1,
            state: SchedulerState::default(),
            gauge,
            admitting: true,
        }
    }

    /// Reconcile running VUs with the plan at `elapsed`.
    ///
    /// `spawn` is given a new VU number, never reused within the run, and the lifecycle the VU must
    /// follow.
    pub(crate) fn tick<F>(&mut self, elapsed: Duration, spawn: &mut F) -> SchedulerState
    where
        F: FnMut(usize, VuLifecycle) -> anyhow::Result<JoinHandle<()>>,
    {
        self.reap();

        let desired = if self.admitting && elapsed < self.plan.total_duration() {
            self.plan.desired_at(elapsed)
        } else {
            self.admitting = false;
            0
        };

        self.reconcile(desired, spawn);
        self.publish(desired);

        self.state
    }

    fn reconcile<F>(&mut self, desired: usize, spawn: &mut F)
    where
        F: FnMut(usize, VuLifecycle) -> anyhow::Result<JoinHandle<()>>,
    {
        let running = self.running();

        if running < desired {
            for _ in running..desired {
                let vu = self.next_vu;
                let lifecycle = VuLifecycle::new();
                match spawn(vu, lifecycle.clone()) {
                    Ok(thread) => {
                        self.next_vu += 1;
                        self.state.started_total += 1;
                        self.vus.push(VuHandle {
                            vu,
                            lifecycle,
                            thread,
                        });
                    }
                    Err(e) => {
                        log::error!("Failed to start VU {vu}: {e:?}");
                        break;
                    }
                }
            }
        } else if running > desired {
            // Newest first, so that the longest running VUs keep their place.
            self.vus
                .iter()
                .rev()
                .filter(|handle| handle.lifecycle.is_running())
                .take(running - desired)
                .for_each(|handle| {
                    log::debug!("Draining VU {}", handle.vu);
                    handle.lifecycle.drain();
                });
        }
    }

    /// Stop admitting VUs and ask every VU to finish its current iteration.
    pub(crate) fn drain_all(&mut self) {
        self.admitting = false;
        for handle in &self.vus {
            handle.lifecycle.drain();
        }
        self.publish(0);
    }

    /// Join every VU that has exited.
    fn reap(&mut self) {
        let (finished, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.vus)
            .into_iter()
            .partition(|handle| handle.thread.is_finished());
        self.vus = alive;

        for handle in finished {
            handle.lifecycle.stop();
            self.state.stopped_total += 1;
            if handle.thread.join().is_err() {
                log::error!("VU {} panicked", handle.vu);
            }
        }
    }

    /// Wait for all VUs to exit, up to `grace`. Returns the number of VUs that did not exit in time.
    pub(crate) fn wait_for_exit(&mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut last_report = Instant::now();

        loop {
            self.reap();
            self.publish(0);

            if self.vus.is_empty() || Instant::now() >= deadline {
                break;
            }

            if last_report.elapsed() > Duration::from_secs(10) {
                log::warn!("Still waiting for {} VUs to finish their iteration", self.vus.len());
                last_report = Instant::now();
            }

            std::thread::sleep(Duration::from_millis(10));
        }

        self.vus.len()
    }

    pub(crate) fn alive(&self) -> usize {
        self.vus.len()
    }

    fn running(&self) -> usize {
        self.vus
            .iter()
            .filter(|handle| handle.lifecycle.is_running())
            .count()
    }

    fn publish(&mut self, desired: usize) {
        let running = self.running();
        self.state.desired = desired;
        self.state.running = running;
        self.state.draining = self.vus.len() - running;
        self.state.peak = self.state.peak.max(running);
        self.gauge.publish(self.state);
    }
}
