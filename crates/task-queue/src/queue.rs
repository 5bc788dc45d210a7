use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use analysis_core::{canonicalize, ReportType, Task, TaskEvent, TaskEventKind, TaskStatus};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::bus::EventBus;

/// Completed tasks kept in the working set for API listing.
const MAX_TASK_HISTORY: usize = 100;
/// Queued-but-not-running submissions allowed past the worker pool.
const MAX_BACKLOG: usize = 64;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("ticker {ticker} already queued as task {existing_task_id}")]
    Duplicate { ticker: String, existing_task_id: String },
    #[error("queue is full ({0} submissions backlogged)")]
    Busy(usize),
}

/// What a finished run hands back to the queue.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    /// Primary key of the persisted report.
    pub record_id: Option<i64>,
    /// Authoritative name discovered during the run.
    pub name: Option<String>,
    pub message: Option<String>,
}

/// The work a task performs; implemented by the analysis pipeline.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task, force_refresh: bool) -> Result<TaskOutcome, String>;
}

struct QueueState {
    tasks: HashMap<String, Task>,
    /// ticker -> task_id for every non-terminal task.
    active_tickers: HashMap<String, String>,
    backlog: usize,
}

/// Async analysis task queue: bounded workers, dedup by ticker, event
/// publication. One ticker has at most one non-terminal task.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    workers: Arc<Semaphore>,
    bus: Arc<EventBus>,
    runner: Arc<dyn TaskRunner>,
}

impl TaskQueue {
    pub fn new(parallelism: usize, runner: Arc<dyn TaskRunner>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(TaskQueue {
            state: Mutex::new(QueueState {
                tasks: HashMap::new(),
                active_tickers: HashMap::new(),
                backlog: 0,
            }),
            workers: Arc::new(Semaphore::new(parallelism.max(1))),
            bus,
            runner,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start the 15 s heartbeat publisher. Runs until the queue drops.
    pub fn spawn_heartbeat(self: &Arc<Self>) {
        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
            loop {
                interval.tick().await;
                match queue.upgrade() {
                    Some(q) => q.bus.publish(TaskEvent::heartbeat()),
                    None => break,
                }
            }
        });
    }

    /// Submit one ticker. The check-and-insert against the active set is
    /// atomic: concurrent duplicate submissions get the first task's id.
    pub fn submit(
        self: &Arc<Self>,
        raw_ticker: &str,
        report_type: ReportType,
        force_refresh: bool,
    ) -> Result<Task, QueueError> {
        let ticker = canonicalize(raw_ticker);
        let task = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if let Some(existing) = state.active_tickers.get(&ticker) {
                return Err(QueueError::Duplicate {
                    ticker,
                    existing_task_id: existing.clone(),
                });
            }
            if self.workers.available_permits() == 0 && state.backlog >= MAX_BACKLOG {
                return Err(QueueError::Busy(state.backlog));
            }

            let task = Task::new(Uuid::new_v4().simple().to_string(), ticker.clone(), report_type);
            state.tasks.insert(task.task_id.clone(), task.clone());
            state.active_tickers.insert(ticker, task.task_id.clone());
            state.backlog += 1;
            task
        };

        self.bus.publish(TaskEvent::of(TaskEventKind::TaskCreated, task.clone()));

        let queue = Arc::clone(self);
        let task_id = task.task_id.clone();
        tokio::spawn(async move {
            queue.execute(task_id, force_refresh).await;
        });

        Ok(task)
    }

    async fn execute(self: Arc<Self>, task_id: String, force_refresh: bool) {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .expect("worker semaphore closed");

        let started = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.backlog = state.backlog.saturating_sub(1);
            match state.tasks.get_mut(&task_id) {
                Some(task) => {
                    task.status = TaskStatus::Processing;
                    task.started_at = Some(Utc::now());
                    task.progress = 0.1;
                    task.message = Some("analyzing".into());
                    Some(task.clone())
                }
                None => None,
            }
        };
        let Some(task) = started else {
            return;
        };
        self.bus.publish(TaskEvent::of(TaskEventKind::TaskStarted, task.clone()));

        let result = self.runner.run(&task, force_refresh).await;

        let (event_kind, finished) = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let Some(task) = state.tasks.get_mut(&task_id) else {
                return;
            };
            task.completed_at = Some(Utc::now());
            let kind = match result {
                Ok(outcome) => {
                    task.status = TaskStatus::Completed;
                    task.progress = 1.0;
                    task.record_id = outcome.record_id;
                    if outcome.name.is_some() {
                        task.name = outcome.name;
                    }
                    task.message = outcome.message.or(Some("completed".into()));
                    TaskEventKind::TaskCompleted
                }
                Err(error) => {
                    task.status = TaskStatus::Failed;
                    let brief: String = error.chars().take(200).collect();
                    task.message = Some(format!("failed: {brief}"));
                    task.error = Some(brief);
                    TaskEventKind::TaskFailed
                }
            };
            let finished = task.clone();
            state.active_tickers.remove(&finished.ticker);
            Self::prune_history(&mut state);
            (kind, finished)
        };

        self.bus.publish(TaskEvent::of(event_kind, finished));
        drop(permit);
    }

    fn prune_history(state: &mut QueueState) {
        if state.tasks.len() <= MAX_TASK_HISTORY {
            return;
        }
        let mut terminal: Vec<(String, chrono::DateTime<Utc>)> = state
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .map(|t| (t.task_id.clone(), t.created_at))
            .collect();
        terminal.sort_by_key(|(_, created)| *created);
        let excess = state.tasks.len() - MAX_TASK_HISTORY;
        for (task_id, _) in terminal.into_iter().take(excess) {
            state.tasks.remove(&task_id);
        }
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.state.lock().expect("queue lock poisoned").tasks.get(task_id).cloned()
    }

    pub fn list(&self, status: Option<TaskStatus>, limit: usize) -> Vec<Task> {
        let state = self.state.lock().expect("queue lock poisoned");
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.truncate(limit);
        tasks
    }

    pub fn stats(&self) -> HashMap<&'static str, usize> {
        let state = self.state.lock().expect("queue lock poisoned");
        let mut stats: HashMap<&'static str, usize> = HashMap::from([
            ("total", state.tasks.len()),
            ("pending", 0),
            ("processing", 0),
            ("completed", 0),
            ("failed", 0),
        ]);
        for task in state.tasks.values() {
            *stats.entry(task.status.as_str()).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubRunner {
        delay: Duration,
        fail: bool,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
        runs: AtomicUsize,
    }

    impl StubRunner {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(StubRunner {
                delay,
                fail,
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TaskRunner for StubRunner {
        async fn run(&self, task: &Task, _force_refresh: bool) -> Result<TaskOutcome, String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(format!("no data for {}", task.ticker));
            }
            Ok(TaskOutcome {
                record_id: Some(42),
                name: Some("Stub Co".into()),
                message: None,
            })
        }
    }

    fn queue(parallelism: usize, runner: Arc<StubRunner>) -> Arc<TaskQueue> {
        TaskQueue::new(parallelism, runner, Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn lifecycle_events_in_order() {
        let q = queue(2, StubRunner::new(Duration::from_millis(10), false));
        let mut sub = q.bus().subscribe();
        let task = q.submit("600519", ReportType::Detailed, false).unwrap();

        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(sub.receiver.recv().await.unwrap().kind);
        }
        assert_eq!(
            kinds,
            vec![TaskEventKind::TaskCreated, TaskEventKind::TaskStarted, TaskEventKind::TaskCompleted]
        );
        let done = q.get(&task.task_id).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.record_id, Some(42));
        assert_eq!(done.name.as_deref(), Some("Stub Co"));
    }

    #[tokio::test]
    async fn duplicate_ticker_rejected_case_insensitively() {
        let q = queue(1, StubRunner::new(Duration::from_millis(200), false));
        let first = q.submit("AAPL", ReportType::Detailed, false).unwrap();
        let err = q.submit("aapl", ReportType::Detailed, false).unwrap_err();
        match err {
            QueueError::Duplicate { ticker, existing_task_id } => {
                assert_eq!(ticker, "AAPL");
                assert_eq!(existing_task_id, first.task_id);
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resubmission_allowed_after_terminal() {
        let q = queue(1, StubRunner::new(Duration::from_millis(5), false));
        let mut sub = q.bus().subscribe();
        q.submit("AAPL", ReportType::Detailed, false).unwrap();
        // Wait for the terminal event.
        loop {
            let e = sub.receiver.recv().await.unwrap();
            if e.kind == TaskEventKind::TaskCompleted {
                break;
            }
        }
        assert!(q.submit("AAPL", ReportType::Detailed, false).is_ok());
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let runner = StubRunner::new(Duration::from_millis(30), false);
        let q = queue(2, runner.clone());
        let mut sub = q.bus().subscribe();
        for ticker in ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA"] {
            q.submit(ticker, ReportType::Detailed, false).unwrap();
        }
        let mut completed = 0;
        while completed < 5 {
            let e = sub.receiver.recv().await.unwrap();
            if e.kind == TaskEventKind::TaskCompleted {
                completed += 1;
            }
        }
        assert!(runner.max_concurrent.load(Ordering::SeqCst) <= 2);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failure_is_terminal_with_error() {
        let q = queue(1, StubRunner::new(Duration::from_millis(1), true));
        let mut sub = q.bus().subscribe();
        let task = q.submit("600519", ReportType::Detailed, false).unwrap();
        loop {
            let e = sub.receiver.recv().await.unwrap();
            if e.kind == TaskEventKind::TaskFailed {
                break;
            }
        }
        let failed = q.get(&task.task_id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("600519"));
    }

    #[tokio::test]
    async fn stats_track_statuses() {
        let q = queue(1, StubRunner::new(Duration::from_millis(1), false));
        let mut sub = q.bus().subscribe();
        q.submit("AAPL", ReportType::Detailed, false).unwrap();
        loop {
            if sub.receiver.recv().await.unwrap().kind == TaskEventKind::TaskCompleted {
                break;
            }
        }
        let stats = q.stats();
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["completed"], 1);
    }
}
