//! PollScheduler - 定期ポーリングのトリガー
//!
//! 計算中のタスクがある間だけ一定間隔で `Controller::poll` を呼ぶ。
//! 計算中のタスクがなくなると自分で止まるので、不要なリモート呼び出しはしない。
//!
//! - `start()` / `stop()` で有効・無効を切り替える
//! - `schedule_once(delay)` で有効・無効に関係なく 1 回だけ予約する
//! - `run()` は shutdown（watch チャネル）が来るまでループする
//! - `SchedulingDelegate` はイベントに応じて再開・予約する（送信・回収で start、
//!   読み込みで schedule_once）

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use super::controller::Controller;
use crate::domain::errors::RemoteError;
use crate::domain::ids::RemoteTaskId;
use crate::ports::EventDelegate;

pub struct PollScheduler {
    interval: Duration,
    active: AtomicBool,
    once: StdMutex<Option<Instant>>,
    wake: Notify,
}

impl PollScheduler {
    /// A zero interval disables the repeating poll.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            active: AtomicBool::new(false),
            once: StdMutex::new(None),
            wake: Notify::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            debug!(interval_ms = self.interval.as_millis() as u64, "polling started");
            self.wake.notify_one();
        }
    }

    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("polling stopped");
            self.wake.notify_one();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Poll once after `delay`, keeping an earlier pending request.
    pub fn schedule_once(&self, delay: Duration) {
        let at = Instant::now() + delay;
        let mut once = self.once.lock().unwrap_or_else(PoisonError::into_inner);
        if once.is_none_or(|pending| at < pending) {
            *once = Some(at);
        }
        drop(once);
        self.wake.notify_one();
    }

    fn next_deadline(&self) -> Option<Instant> {
        let repeating = (self.is_active() && !self.interval.is_zero())
            .then(|| Instant::now() + self.interval);
        let once = *self.once.lock().unwrap_or_else(PoisonError::into_inner);
        match (repeating, once) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn clear_due_once(&self) {
        let mut once = self.once.lock().unwrap_or_else(PoisonError::into_inner);
        if once.is_some_and(|at| at <= Instant::now()) {
            *once = None;
        }
    }

    /// Poll once; stop when nothing is computing any more.
    ///
    /// Returns whether some task is still computing.
    pub async fn tick(&self, controller: &Mutex<Controller>) -> bool {
        let mut controller = controller.lock().await;
        controller.poll().await;
        let computing = controller.is_computing();
        if !computing {
            self.stop();
        }
        computing
    }

    /// Drive `controller` until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, controller: Arc<Mutex<Controller>>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let deadline = self.next_deadline();

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.wake.notified() => {}
                _ = sleep_until_opt(deadline) => {
                    self.clear_due_once();
                    self.tick(&controller).await;
                }
            }
        }
        debug!("poll scheduler exited");
    }

    pub fn spawn(
        self: &Arc<Self>,
        controller: Arc<Mutex<Controller>>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run(controller, shutdown).await })
    }
}

/// Event delegate that keeps a `PollScheduler` in step with the controller.
///
/// Every event is forwarded to `inner` afterwards.
pub struct SchedulingDelegate {
    scheduler: Arc<PollScheduler>,
    inner: Arc<dyn EventDelegate>,
}

impl SchedulingDelegate {
    pub fn new(scheduler: Arc<PollScheduler>, inner: Arc<dyn EventDelegate>) -> Self {
        Self { scheduler, inner }
    }
}

impl EventDelegate for SchedulingDelegate {
    fn on_connection_established(&self) {
        self.inner.on_connection_established();
    }

    fn on_connection_failed(&self, err: &RemoteError) {
        self.inner.on_connection_failed(err);
    }

    fn on_task_submitted(&self, id: &RemoteTaskId) {
        self.scheduler.start();
        self.inner.on_task_submitted(id);
    }

    fn on_task_retrieved(&self, id: &RemoteTaskId) {
        self.scheduler.start();
        self.inner.on_task_retrieved(id);
    }

    fn on_task_loaded(&self, id: &RemoteTaskId) {
        // other tasks may have concluded while the results were loading
        self.scheduler.schedule_once(self.scheduler.interval());
        self.inner.on_task_loaded(id);
    }

    fn on_task_deleted(&self, id: &RemoteTaskId) {
        self.inner.on_task_deleted(id);
    }

    fn on_task_finished(&self, id: &RemoteTaskId) {
        self.inner.on_task_finished(id);
    }

    fn on_task_failed(&self, id: &RemoteTaskId) {
        self.inner.on_task_failed(id);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::builder::ControllerBuilder;
    use crate::config::credential::Credential;
    use crate::domain::events::DomainEvent;
    use crate::domain::solver::SolverRef;
    use crate::impls::{InMemoryCompute, InMemoryHost, RecordingDelegate, ScriptedSolvers};
    use tempfile::TempDir;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    /// A connected controller with one computing task.
    async fn computing(waits: u32) -> (Arc<Mutex<Controller>>, InMemoryCompute, TempDir) {
        let compute = InMemoryCompute::new();
        compute.set_waits_until_done(waits);
        let host = Arc::new(InMemoryHost::new());
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        let solver = host.add_solver(&doc, "SolverElmer", "Elmer", "Fem::SolverElmer");
        let solvers = Arc::new(ScriptedSolvers::new(host.clone()));
        let mut controller = ControllerBuilder::new(Arc::new(compute.clone()), host, solvers)
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(controller.establish_connection(&Credential::new(TOKEN)).await);
        controller
            .start(&solver, Some("run"), Some(dir.path()))
            .await
            .unwrap()
            .unwrap();
        (Arc::new(Mutex::new(controller)), compute, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_scheduler_does_not_poll() {
        let (controller, compute, _dir) = computing(0).await;
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(controller, rx);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(compute.wait_calls(), 0);
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn active_scheduler_polls_until_nothing_computes() {
        let (controller, compute, _dir) = computing(2).await;
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(controller.clone(), rx);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(30)).await;

        // two "not done" answers, then the conclusion
        assert_eq!(compute.wait_calls(), 3);
        assert!(!scheduler.is_active());
        assert!(!controller.lock().await.is_computing());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_once_polls_a_single_time() {
        let (controller, compute, _dir) = computing(5).await;
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(controller, rx);

        scheduler.schedule_once(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(compute.wait_calls(), 1);
        drop(tx);
        handle.await.unwrap();
    }

    /// A connected controller whose events drive `scheduler`.
    async fn scheduled(
        scheduler: &Arc<PollScheduler>,
        events: Arc<RecordingDelegate>,
    ) -> (Arc<Mutex<Controller>>, InMemoryCompute, SolverRef) {
        let compute = InMemoryCompute::new();
        let host = Arc::new(InMemoryHost::new());
        let doc = host.open_document("Beam", "/tmp/beam.FCStd");
        let solver = host.add_solver(&doc, "SolverElmer", "Elmer", "Fem::SolverElmer");
        let solvers = Arc::new(ScriptedSolvers::new(host.clone()));
        let mut controller = ControllerBuilder::new(Arc::new(compute.clone()), host, solvers)
            .events(Arc::new(SchedulingDelegate::new(scheduler.clone(), events)))
            .build()
            .unwrap();
        assert!(controller.establish_connection(&Credential::new(TOKEN)).await);
        (Arc::new(Mutex::new(controller)), compute, solver)
    }

    #[tokio::test(start_paused = true)]
    async fn submission_after_idle_restarts_polling() {
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let events = Arc::new(RecordingDelegate::new());
        let (controller, compute, solver) = scheduled(&scheduler, events.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(controller.clone(), rx);

        let first = controller
            .lock()
            .await
            .start(&solver, Some("a"), Some(dir.path()))
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.is_active());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!scheduler.is_active());
        assert_eq!(compute.wait_calls(), 1);

        let second = controller
            .lock()
            .await
            .start(&solver, Some("b"), Some(dir.path()))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(compute.wait_calls(), 2);
        assert!(!scheduler.is_active());
        assert!(!controller.lock().await.is_computing());
        let events = events.events();
        assert!(events.contains(&DomainEvent::TaskFinished(first)));
        assert!(events.contains(&DomainEvent::TaskFinished(second)));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loading_schedules_a_single_poll() {
        let scheduler = Arc::new(PollScheduler::new(Duration::from_secs(2)));
        let events = Arc::new(RecordingDelegate::new());
        let (controller, compute, solver) = scheduled(&scheduler, events.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let finished = {
            let mut controller = controller.lock().await;
            let id = controller
                .start(&solver, Some("a"), Some(dir.path()))
                .await
                .unwrap()
                .unwrap();
            controller.poll().await;
            compute.set_waits_until_done(5);
            controller
                .start(&solver, Some("b"), Some(dir.path()))
                .await
                .unwrap()
                .unwrap();
            id
        };
        scheduler.stop();
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(controller.clone(), rx);

        controller.lock().await.load_result(&finished).await.unwrap();
        assert!(!scheduler.is_active());
        tokio::time::sleep(Duration::from_secs(10)).await;

        // one poll for "a", one scheduled by the load
        assert_eq!(compute.wait_calls(), 2);
        assert!(controller.lock().await.is_computing());
        assert!(events.events().contains(&DomainEvent::TaskLoaded(finished)));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn tick_stops_when_idle() {
        let (controller, _compute, _dir) = computing(0).await;
        let scheduler = PollScheduler::new(Duration::from_secs(2));
        scheduler.start();

        assert!(!scheduler.tick(&controller).await);
        assert!(!scheduler.is_active());
    }
}
