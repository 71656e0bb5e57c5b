//! The sync scheduler: one loop that owns the displayed month and decides
//! when to recompute the grid, refetch tasks and redraw.
//!
//! Trigger sources (midnight timer, heartbeat, wake detector, data-changed
//! watcher, navigation) never do work themselves. They set a flag in the
//! [`TriggerLatch`] and return; the loop drains every pending flag at once
//! and runs a single reconcile for the whole batch.

use crate::application::presenter::Presenter;
use crate::application::task_store::TaskSync;
use crate::domain::calendar_grid::{compute_grid, normalize_month, status_glyph, CalendarGrid};
use crate::domain::models::{StatusGlyph, Task, TaskBucket};
use crate::error::CoreError;
use crate::infrastructure::change_signal::ChangeNotifier;
use crate::infrastructure::clock::{system_now, LocalCalendar, NowProvider};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use chrono::{Datelike, NaiveDate};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Midnight,
    Wake,
    DataChanged,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    PrevMonth,
    NextMonth,
    CurrentMonth,
}

/// Everything that arrived since the loop last looked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet {
    pub midnight: bool,
    pub wake: bool,
    pub data_changed: bool,
    pub heartbeat: bool,
    pub navigations: Vec<Navigation>,
}

impl TriggerSet {
    fn insert(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Midnight => self.midnight = true,
            Trigger::Wake => self.wake = true,
            Trigger::DataChanged => self.data_changed = true,
            Trigger::Heartbeat => self.heartbeat = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.midnight || self.wake || self.data_changed || self.heartbeat)
            && self.navigations.is_empty()
    }
}

#[derive(Debug, Default)]
struct LatchState {
    pending: TriggerSet,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct TriggerLatch {
    state: Mutex<LatchState>,
    notify: Notify,
}

impl TriggerLatch {
    pub fn signal(&self, trigger: Trigger) {
        self.update(|pending| pending.insert(trigger));
    }

    pub fn navigate(&self, navigation: Navigation) {
        self.update(|pending| pending.navigations.push(navigation));
    }

    pub fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.notify.notify_one();
    }

    fn update(&self, apply: impl FnOnce(&mut TriggerSet)) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return;
            }
            apply(&mut state.pending);
        }
        self.notify.notify_one();
    }

    /// Waits for at least one pending trigger and takes all of them.
    /// `None` once the latch is closed.
    pub async fn next(&self) -> Option<TriggerSet> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.closed {
                    return None;
                }
                if !state.pending.is_empty() {
                    return Some(mem::take(&mut state.pending));
                }
            }
            notified.await;
        }
    }
}

/// Snapshot published after every reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarView {
    pub month: u32,
    pub year: i32,
    pub grid: CalendarGrid,
    pub bucket: Arc<TaskBucket>,
    pub today: NaiveDate,
    pub is_current_month: bool,
    pub last_error: Option<CoreError>,
    pub status: StatusGlyph,
    pub revision: u64,
}

impl CalendarView {
    pub fn tasks_on(&self, date: NaiveDate) -> &[Task] {
        self.bucket.tasks_on(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeCheck {
    pub interval: Duration,
    pub threshold: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub heartbeat: Option<Duration>,
    pub wake_check: Option<WakeCheck>,
    pub weekday_labels: [String; 7],
}

impl SchedulerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            heartbeat: Some(config.heartbeat()),
            wake_check: Some(WakeCheck {
                interval: config.wake_check_interval(),
                threshold: config.wake_jump_threshold(),
            }),
            weekday_labels: config.weekday_labels.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SchedulerState {
    pub displayed_month: u32,
    pub displayed_year: i32,
    pub last_observed_local_date: NaiveDate,
    pending_midnight_timer: Option<AbortHandle>,
}

impl SchedulerState {
    fn shows_month_of(&self, date: NaiveDate) -> bool {
        self.displayed_year == date.year() && self.displayed_month == date.month()
    }
}

/// Cheap, cloneable way in from the outside world.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    latch: Arc<TriggerLatch>,
    snapshots: watch::Receiver<Arc<CalendarView>>,
}

impl SchedulerHandle {
    pub fn trigger(&self, trigger: Trigger) {
        self.latch.signal(trigger);
    }

    pub fn wake(&self) {
        self.trigger(Trigger::Wake);
    }

    pub fn data_changed(&self) {
        self.trigger(Trigger::DataChanged);
    }

    pub fn goto_prev_month(&self) {
        self.latch.navigate(Navigation::PrevMonth);
    }

    pub fn goto_next_month(&self) {
        self.latch.navigate(Navigation::NextMonth);
    }

    pub fn goto_current_month(&self) {
        self.latch.navigate(Navigation::CurrentMonth);
    }

    pub fn snapshot(&self) -> Arc<CalendarView> {
        Arc::clone(&*self.snapshots.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CalendarView>> {
        self.snapshots.clone()
    }
}

impl ChangeNotifier for SchedulerHandle {
    fn notify_changed(&self) -> Result<(), InfraError> {
        self.data_changed();
        Ok(())
    }
}

pub struct SyncScheduler<T>
where
    T: TaskSync + 'static,
{
    tasks: Arc<T>,
    presenter: Arc<dyn Presenter>,
    config: SchedulerConfig,
    calendar: LocalCalendar,
    now_provider: NowProvider,
    latch: Arc<TriggerLatch>,
    state: SchedulerState,
    grid: CalendarGrid,
    bucket: Arc<TaskBucket>,
    last_error: Option<CoreError>,
    revision: u64,
    snapshots: watch::Sender<Arc<CalendarView>>,
}

impl<T> SyncScheduler<T>
where
    T: TaskSync + 'static,
{
    pub fn new(
        tasks: Arc<T>,
        presenter: Arc<dyn Presenter>,
        config: SchedulerConfig,
        calendar: LocalCalendar,
    ) -> Self {
        Self::with_now_provider(tasks, presenter, config, calendar, system_now())
    }

    pub fn with_now_provider(
        tasks: Arc<T>,
        presenter: Arc<dyn Presenter>,
        config: SchedulerConfig,
        calendar: LocalCalendar,
        now_provider: NowProvider,
    ) -> Self {
        let today = calendar.today(now_provider());
        let state = SchedulerState {
            displayed_month: today.month(),
            displayed_year: today.year(),
            last_observed_local_date: today,
            pending_midnight_timer: None,
        };
        let grid = compute_grid(state.displayed_year, state.displayed_month, today);
        let bucket = Arc::new(TaskBucket::default());
        let initial = CalendarView {
            month: state.displayed_month,
            year: state.displayed_year,
            grid: grid.clone(),
            bucket: Arc::clone(&bucket),
            today,
            is_current_month: true,
            last_error: None,
            status: status_glyph(today, &config.weekday_labels),
            revision: 0,
        };
        let (snapshots, _) = watch::channel(Arc::new(initial));

        Self {
            tasks,
            presenter,
            config,
            calendar,
            now_provider,
            latch: Arc::new(TriggerLatch::default()),
            state,
            grid,
            bucket,
            last_error: None,
            revision: 0,
            snapshots,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            latch: Arc::clone(&self.latch),
            snapshots: self.snapshots.subscribe(),
        }
    }

    /// Starts the loop plus the heartbeat and wake-detector tasks.
    pub fn spawn(self) -> RunningScheduler {
        let handle = self.handle();
        let latch = Arc::clone(&self.latch);
        let mut auxiliary = Vec::new();

        if let Some(period) = self.config.heartbeat {
            auxiliary.push(tokio::spawn(run_heartbeat(Arc::clone(&latch), period)));
        }
        if let Some(check) = self.config.wake_check {
            auxiliary.push(tokio::spawn(run_wake_detector(
                Arc::clone(&latch),
                Arc::clone(&self.now_provider),
                check,
            )));
        }

        let main = tokio::spawn(self.run());
        RunningScheduler {
            handle,
            latch,
            main,
            auxiliary,
        }
    }

    async fn run(mut self) {
        info!(
            year = self.state.displayed_year,
            month = self.state.displayed_month,
            "scheduler started"
        );
        self.arm_midnight();
        self.reconcile(TriggerSet::default()).await;

        while let Some(triggers) = self.latch.next().await {
            self.reconcile(triggers).await;
        }

        if let Some(timer) = self.state.pending_midnight_timer.take() {
            timer.abort();
        }
        info!("scheduler stopped");
    }

    fn today(&self) -> NaiveDate {
        self.calendar.today((self.now_provider)())
    }

    fn arm_midnight(&mut self) {
        if let Some(previous) = self.state.pending_midnight_timer.take() {
            previous.abort();
        }
        let delay = self.calendar.until_next_midnight((self.now_provider)());
        let latch = Arc::clone(&self.latch);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            latch.signal(Trigger::Midnight);
        });
        self.state.pending_midnight_timer = Some(timer.abort_handle());
        debug!(delay_secs = delay.as_secs(), "midnight timer armed");
    }

    async fn reconcile(&mut self, triggers: TriggerSet) {
        let today = self.today();
        let mut grid_stale = false;
        debug!(?triggers, %today, "reconcile");

        if today != self.state.last_observed_local_date {
            let previous = self.state.last_observed_local_date;
            if self.state.shows_month_of(previous) {
                self.state.displayed_year = today.year();
                self.state.displayed_month = today.month();
            }
            self.state.last_observed_local_date = today;
            info!(%previous, %today, "local date changed");
            self.arm_midnight();
            grid_stale = true;
        } else if triggers.midnight {
            self.arm_midnight();
        }

        for navigation in &triggers.navigations {
            let (year, month) = match navigation {
                Navigation::PrevMonth => normalize_month(
                    self.state.displayed_year,
                    self.state.displayed_month as i32 - 1,
                ),
                Navigation::NextMonth => normalize_month(
                    self.state.displayed_year,
                    self.state.displayed_month as i32 + 1,
                ),
                Navigation::CurrentMonth => (today.year(), today.month()),
            };
            self.state.displayed_year = year;
            self.state.displayed_month = month;
            grid_stale = true;
        }

        if grid_stale {
            self.grid = compute_grid(self.state.displayed_year, self.state.displayed_month, today);
        }

        let (start, end) = self.grid.range();
        match self.tasks.sync(start, end).await {
            Ok(bucket) => {
                self.bucket = Arc::new(bucket);
                self.last_error = None;
            }
            Err(error) => {
                if error.is_auth() {
                    warn!(%error, kind = error.kind(), "task refresh skipped");
                } else {
                    error!(%error, kind = error.kind(), "task refresh failed; keeping previous tasks");
                }
                self.last_error = Some(error);
            }
        }

        self.publish(today);
    }

    fn publish(&mut self, today: NaiveDate) {
        self.revision += 1;
        let view = Arc::new(CalendarView {
            month: self.state.displayed_month,
            year: self.state.displayed_year,
            grid: self.grid.clone(),
            bucket: Arc::clone(&self.bucket),
            today,
            is_current_month: self.state.shows_month_of(today),
            last_error: self.last_error.clone(),
            status: status_glyph(today, &self.config.weekday_labels),
            revision: self.revision,
        });

        self.presenter.render_grid(&view);
        self.presenter.render_status_glyph(&view.status);
        self.snapshots.send_replace(view);
    }
}

pub struct RunningScheduler {
    handle: SchedulerHandle,
    latch: Arc<TriggerLatch>,
    main: JoinHandle<()>,
    auxiliary: Vec<JoinHandle<()>>,
}

impl RunningScheduler {
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Lets an in-flight reconcile finish, then stops everything.
    pub async fn shutdown(self) {
        for task in &self.auxiliary {
            task.abort();
        }
        self.latch.close();
        if let Err(error) = self.main.await {
            warn!(%error, "scheduler loop ended abnormally");
        }
    }
}

async fn run_heartbeat(latch: Arc<TriggerLatch>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        latch.signal(Trigger::Heartbeat);
    }
}

// The monotonic clock stops while the machine sleeps and the wall clock
// does not, so a gap between the two means we were suspended (or the
// clock was set).
async fn run_wake_detector(latch: Arc<TriggerLatch>, now_provider: NowProvider, check: WakeCheck) {
    let mut ticker = tokio::time::interval(check.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let threshold = chrono::Duration::from_std(check.threshold).unwrap_or(chrono::Duration::MAX);
    let mut wall = now_provider();
    let mut monotonic = Instant::now();
    loop {
        ticker.tick().await;
        let (wall_now, monotonic_now) = (now_provider(), Instant::now());
        let monotonic_elapsed =
            chrono::Duration::from_std(monotonic_now - monotonic).unwrap_or(chrono::Duration::MAX);
        let drift = (wall_now - wall) - monotonic_elapsed;
        if drift.abs() > threshold {
            info!(drift_secs = drift.num_seconds(), "wall clock jumped; treating as wake");
            latch.signal(Trigger::Wake);
        }
        wall = wall_now;
        monotonic = monotonic_now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct FakeTaskSync {
        calls: AtomicUsize,
        responses: StdMutex<VecDeque<Result<TaskBucket, CoreError>>>,
        ranges: StdMutex<Vec<(NaiveDate, NaiveDate)>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl FakeTaskSync {
        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn push(&self, response: Result<TaskBucket, CoreError>) {
            self.responses.lock().expect("responses mutex poisoned").push_back(response);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskSync for FakeTaskSync {
        async fn sync(&self, start: NaiveDate, end: NaiveDate) -> Result<TaskBucket, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ranges.lock().expect("ranges mutex poisoned").push((start, end));
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate open").forget();
            }
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(TaskBucket::default()))
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        grids: AtomicUsize,
        glyphs: StdMutex<Vec<StatusGlyph>>,
    }

    impl Presenter for RecordingPresenter {
        fn render_grid(&self, _view: &CalendarView) {
            self.grids.fetch_add(1, Ordering::SeqCst);
        }

        fn render_status_glyph(&self, glyph: &StatusGlyph) {
            self.glyphs.lock().expect("glyphs mutex poisoned").push(glyph.clone());
        }
    }

    fn quiet_config() -> SchedulerConfig {
        SchedulerConfig {
            heartbeat: None,
            wake_check: None,
            weekday_labels: ["Thứ 2", "Thứ 3", "Thứ 4", "Thứ 5", "Thứ 6", "Thứ 7", "Chủ Nhật"]
                .map(String::from),
        }
    }

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn utc() -> LocalCalendar {
        LocalCalendar::from_name(Some("UTC"))
    }

    fn manual_clock(start: DateTime<Utc>) -> (Arc<StdMutex<DateTime<Utc>>>, NowProvider) {
        let clock = Arc::new(StdMutex::new(start));
        let reader = Arc::clone(&clock);
        let provider: NowProvider = Arc::new(move || *reader.lock().expect("clock mutex poisoned"));
        (clock, provider)
    }

    // Wall clock that follows tokio's (possibly paused) clock, plus a
    // manually injected jump.
    fn tokio_clock(base: DateTime<Utc>) -> (Arc<AtomicI64>, NowProvider) {
        let origin = Instant::now();
        let jump = Arc::new(AtomicI64::new(0));
        let offset = Arc::clone(&jump);
        let provider: NowProvider = Arc::new(move || {
            base + chrono::Duration::from_std(origin.elapsed()).unwrap_or_default()
                + chrono::Duration::seconds(offset.load(Ordering::SeqCst))
        });
        (jump, provider)
    }

    // Paused-clock tests auto-advance to the next timer, so the limit must
    // outlast every timer the scheduler can arm.
    const LIMIT: Duration = Duration::from_secs(3 * 24 * 3600);

    async fn wait_revision(
        snapshots: &mut watch::Receiver<Arc<CalendarView>>,
        revision: u64,
    ) -> Arc<CalendarView> {
        let view = tokio::time::timeout(
            LIMIT,
            snapshots.wait_for(|view| view.revision >= revision),
        )
        .await
        .expect("revision published in time")
        .expect("scheduler alive");
        Arc::clone(&*view)
    }

    fn bucket_with(id: &str, due: NaiveDate) -> TaskBucket {
        TaskBucket::from_tasks(vec![Task {
            id: id.to_string(),
            title: id.to_string(),
            notes: String::new(),
            due,
            status: TaskStatus::NeedsAction,
            position: "00000000000000000000".to_string(),
        }])
    }

    #[test]
    fn latch_merges_triggers_and_keeps_navigation_order() {
        let latch = TriggerLatch::default();
        latch.signal(Trigger::Wake);
        latch.signal(Trigger::Wake);
        latch.navigate(Navigation::NextMonth);
        latch.signal(Trigger::DataChanged);
        latch.navigate(Navigation::PrevMonth);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let set = runtime.block_on(latch.next()).expect("pending triggers");
        assert!(set.wake && set.data_changed);
        assert!(!set.midnight && !set.heartbeat);
        assert_eq!(set.navigations, vec![Navigation::NextMonth, Navigation::PrevMonth]);

        latch.close();
        assert_eq!(runtime.block_on(latch.next()), None);
    }

    #[tokio::test]
    async fn initial_run_syncs_the_displayed_grid_range() {
        let (_clock, now) = manual_clock(at("2026-02-16T12:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        tasks.push(Ok(bucket_with("t1", date("2026-02-16"))));
        let presenter = Arc::new(RecordingPresenter::default());

        let scheduler = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::clone(&presenter) as Arc<dyn Presenter>,
            quiet_config(),
            utc(),
            now,
        );
        let running = scheduler.spawn();
        let mut snapshots = running.handle().subscribe();

        let view = wait_revision(&mut snapshots, 1).await;
        assert_eq!((view.year, view.month), (2026, 2));
        assert!(view.is_current_month);
        assert_eq!(view.tasks_on(date("2026-02-16")).len(), 1);
        assert_eq!(view.status.weekday_label, "Thứ 2");
        assert_eq!(
            tasks.ranges.lock().expect("ranges").clone(),
            vec![(date("2026-01-26"), date("2026-03-08"))]
        );
        assert_eq!(presenter.grids.load(Ordering::SeqCst), 1);
        assert_eq!(presenter.glyphs.lock().expect("glyphs").len(), 1);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn triggers_during_a_run_cause_exactly_one_more_sync() {
        let (_clock, now) = manual_clock(at("2026-02-16T12:00:00Z"));
        let gate = Arc::new(Semaphore::new(0));
        let tasks = Arc::new(FakeTaskSync::gated(Arc::clone(&gate)));

        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();

        while tasks.calls() == 0 {
            tokio::task::yield_now().await;
        }
        handle.wake();
        handle.data_changed();
        handle.trigger(Trigger::Heartbeat);
        gate.add_permits(10);

        let view = wait_revision(&mut snapshots, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(view.revision, 2);
        assert_eq!(tasks.calls(), 2);
        assert_eq!(handle.snapshot().revision, 2);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn failed_sync_keeps_previous_bucket() {
        let (_clock, now) = manual_clock(at("2026-02-16T12:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        tasks.push(Ok(bucket_with("kept", date("2026-02-16"))));
        tasks.push(Err(CoreError::Sync("page 2: http 500".to_string())));

        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();

        let first = wait_revision(&mut snapshots, 1).await;
        handle.data_changed();
        let second = wait_revision(&mut snapshots, 2).await;

        assert_eq!(second.bucket, first.bucket);
        assert_eq!(second.tasks_on(date("2026-02-16"))[0].id, "kept");
        assert!(matches!(second.last_error, Some(CoreError::Sync(_))));

        handle.data_changed();
        let third = wait_revision(&mut snapshots, 3).await;
        assert_eq!(third.last_error, None);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn navigation_moves_the_view_and_refetches_its_range() {
        let (_clock, now) = manual_clock(at("2026-12-10T12:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();
        wait_revision(&mut snapshots, 1).await;

        handle.goto_next_month();
        let view = wait_revision(&mut snapshots, 2).await;
        assert_eq!((view.year, view.month), (2027, 1));
        assert!(!view.is_current_month);
        assert_eq!(view.grid.range(), (date("2026-12-28"), date("2027-02-07")));

        handle.goto_current_month();
        let view = wait_revision(&mut snapshots, 3).await;
        assert_eq!((view.year, view.month), (2026, 12));
        assert!(view.is_current_month);

        handle.goto_prev_month();
        let view = wait_revision(&mut snapshots, 4).await;
        assert_eq!((view.year, view.month), (2026, 11));

        running.shutdown().await;
    }

    #[tokio::test]
    async fn date_change_follows_the_current_month_only() {
        let (clock, now) = manual_clock(at("2026-01-31T12:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();
        wait_revision(&mut snapshots, 1).await;

        *clock.lock().expect("clock") = at("2026-02-01T08:00:00Z");
        handle.wake();
        let view = wait_revision(&mut snapshots, 2).await;
        assert_eq!(view.today, date("2026-02-01"));
        assert_eq!((view.year, view.month), (2026, 2));
        assert!(view.is_current_month);

        handle.goto_next_month();
        handle.goto_next_month();
        wait_revision(&mut snapshots, 3).await;

        *clock.lock().expect("clock") = at("2026-03-01T08:00:00Z");
        handle.wake();
        let view = wait_revision(&mut snapshots, 4).await;
        assert_eq!(view.today, date("2026-03-01"));
        assert_eq!((view.year, view.month), (2026, 4));
        assert!(!view.is_current_month);

        running.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn midnight_timer_rolls_the_view_to_the_new_month() {
        let (_jump, now) = tokio_clock(at("2026-01-31T23:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let mut snapshots = running.handle().subscribe();

        let first = wait_revision(&mut snapshots, 1).await;
        assert_eq!(first.today, date("2026-01-31"));

        let next = wait_revision(&mut snapshots, 2).await;
        assert_eq!(next.today, date("2026-02-01"));
        assert_eq!((next.year, next.month), (2026, 2));
        assert_eq!(next.status.day, 1);

        running.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn navigated_future_month_survives_midnight() {
        let (_jump, now) = tokio_clock(at("2026-01-31T23:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();
        wait_revision(&mut snapshots, 1).await;

        handle.goto_next_month();
        handle.goto_next_month();
        let navigated = wait_revision(&mut snapshots, 2).await;
        assert_eq!((navigated.year, navigated.month), (2026, 3));
        assert_eq!(navigated.today, date("2026-01-31"));

        let after_midnight = wait_revision(&mut snapshots, 3).await;
        assert_eq!(after_midnight.today, date("2026-02-01"));
        assert_eq!((after_midnight.year, after_midnight.month), (2026, 3));

        running.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refetches_periodically() {
        let (_jump, now) = tokio_clock(at("2026-02-16T09:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let config = SchedulerConfig {
            heartbeat: Some(Duration::from_secs(60)),
            ..quiet_config()
        };
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            config,
            utc(),
            now,
        )
        .spawn();
        let mut snapshots = running.handle().subscribe();

        wait_revision(&mut snapshots, 3).await;
        assert!(tasks.calls() >= 3);

        running.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_jump_is_treated_as_wake() {
        let (jump, now) = tokio_clock(at("2026-02-16T09:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let config = SchedulerConfig {
            wake_check: Some(WakeCheck {
                interval: Duration::from_secs(15),
                threshold: Duration::from_secs(60),
            }),
            ..quiet_config()
        };
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            config,
            utc(),
            now,
        )
        .spawn();
        let mut snapshots = running.handle().subscribe();
        wait_revision(&mut snapshots, 1).await;

        jump.store(2 * 3600, Ordering::SeqCst);
        let view = wait_revision(&mut snapshots, 2).await;
        assert_eq!(view.today, date("2026-02-16"));
        assert_eq!(tasks.calls(), 2);

        running.shutdown().await;
    }

    #[tokio::test]
    async fn handle_relays_local_changes_as_data_changed() {
        let (_clock, now) = manual_clock(at("2026-02-16T12:00:00Z"));
        let tasks = Arc::new(FakeTaskSync::default());
        let running = SyncScheduler::with_now_provider(
            Arc::clone(&tasks),
            Arc::new(RecordingPresenter::default()),
            quiet_config(),
            utc(),
            now,
        )
        .spawn();
        let handle = running.handle();
        let mut snapshots = handle.subscribe();
        wait_revision(&mut snapshots, 1).await;

        let notifier: Arc<dyn ChangeNotifier> = Arc::new(handle.clone());
        notifier.notify_changed().expect("post");
        wait_revision(&mut snapshots, 2).await;
        assert_eq!(tasks.calls(), 2);

        running.shutdown().await;
    }
}
