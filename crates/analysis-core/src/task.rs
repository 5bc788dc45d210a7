use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ReportType;

/// Lifecycle state of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One queued or running analysis task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: TaskStatus,
    /// 0.0 .. 1.0
    pub progress: f64,
    #[serde(default)]
    pub message: Option<String>,
    pub report_type: ReportType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Primary key of the persisted report on completion.
    #[serde(default)]
    pub record_id: Option<i64>,
}

impl Task {
    pub fn new(task_id: String, ticker: String, report_type: ReportType) -> Self {
        Task {
            task_id,
            ticker,
            name: None,
            status: TaskStatus::Pending,
            progress: 0.0,
            message: Some("queued".into()),
            report_type,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            record_id: None,
        }
    }
}

/// Kinds of events published on the task event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Connected,
    TaskCreated,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
    Heartbeat,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventKind::Connected => "connected",
            TaskEventKind::TaskCreated => "task_created",
            TaskEventKind::TaskStarted => "task_started",
            TaskEventKind::TaskCompleted => "task_completed",
            TaskEventKind::TaskFailed => "task_failed",
            TaskEventKind::TaskSkipped => "task_skipped",
            TaskEventKind::Heartbeat => "heartbeat",
        }
    }
}

/// An event on the bus. Heartbeats carry no task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    #[serde(default)]
    pub task: Option<Task>,
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn of(kind: TaskEventKind, task: Task) -> Self {
        TaskEvent { kind, task: Some(task), at: Utc::now() }
    }

    pub fn heartbeat() -> Self {
        TaskEvent { kind: TaskEventKind::Heartbeat, task: None, at: Utc::now() }
    }
}
