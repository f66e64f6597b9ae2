//! Task queue and worker pool
//!
//! Decouples request handling from long-running model calls. Enqueue is
//! non-blocking and returns a task id immediately; all model-bound work
//! happens inside a worker. Workers consume tasks in enqueue order from one
//! shared channel, each processing a single task end-to-end.
//!
//! Failures are retried up to a fixed attempt budget with the same payload;
//! only the terminal outcome is visible to callers. Cancellation of a
//! running task is best-effort: the worker is signaled but an in-flight
//! model call is never preempted, so the task may still finish.

use crate::config::QueueConfig;
use crate::error::{HazardScopeError, Result};
use crate::ids::generate_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// Unit-of-work kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ImageAnalysis,
    AnswerGeneration,
    FullQuery,
}

/// Task lifecycle states; `Finished`, `Failed`, and `Cancelled` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Observable task state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Best-effort progress: 0 at start, 100 when finished
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempt_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Work implementation plugged into the pool
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        kind: TaskKind,
        payload: &Value,
        progress: &ProgressHandle,
    ) -> Result<Value>;
}

struct TaskRecord {
    task: Task,
    payload: Value,
    cancel_requested: bool,
    status_tx: watch::Sender<TaskStatus>,
}

type Registry = Arc<RwLock<HashMap<String, TaskRecord>>>;

/// Handle a worker passes to the executor for opportunistic progress updates
pub struct ProgressHandle {
    registry: Registry,
    task_id: String,
}

impl ProgressHandle {
    /// Record progress if the task is still running; silently ignored
    /// otherwise
    pub async fn set(&self, percent: u8) {
        let mut registry = self.registry.write().await;
        if let Some(record) = registry.get_mut(&self.task_id) {
            if record.task.status == TaskStatus::Running {
                record.task.progress = percent.min(100);
            }
        }
    }
}

/// Shared FIFO task queue with an attached worker pool
pub struct TaskQueue {
    registry: Registry,
    sender: mpsc::UnboundedSender<String>,
    worker_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TaskQueue {
    /// Start the queue and spawn the configured number of workers
    pub fn start(config: QueueConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = config.workers.max(1);
        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            worker_handles.push(tokio::spawn(worker_loop(
                worker_id,
                receiver.clone(),
                registry.clone(),
                executor.clone(),
                config.clone(),
            )));
        }

        Self {
            registry,
            sender,
            worker_handles,
        }
    }

    /// Register a task and hand it to the workers. Returns immediately;
    /// no model-bound work happens on this path.
    pub async fn enqueue(&self, kind: TaskKind, payload: Value) -> Result<String> {
        let task_id = generate_id();
        let (status_tx, _) = watch::channel(TaskStatus::Queued);

        let task = Task {
            task_id: task_id.clone(),
            kind,
            status: TaskStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            attempt_count: 0,
            enqueued_at: Utc::now(),
        };

        {
            let mut registry = self.registry.write().await;
            registry.insert(
                task_id.clone(),
                TaskRecord {
                    task,
                    payload,
                    cancel_requested: false,
                    status_tx,
                },
            );
        }

        self.sender.send(task_id.clone()).map_err(|_| {
            HazardScopeError::InvalidInput("task queue has been shut down".to_string())
        })?;

        tracing::debug!(task_id = %task_id, ?kind, "task enqueued");
        Ok(task_id)
    }

    /// Snapshot of a task's observable state
    pub async fn status(&self, task_id: &str) -> Result<Task> {
        let registry = self.registry.read().await;
        registry
            .get(task_id)
            .map(|record| record.task.clone())
            .ok_or_else(|| HazardScopeError::TaskNotFound(task_id.to_string()))
    }

    /// Cancel a task.
    ///
    /// Queued tasks move straight to `Cancelled` and are skipped when a
    /// worker reaches them. Running tasks are signaled and return `true`;
    /// the worker stops retrying once it observes the signal, but cannot
    /// interrupt an in-flight model call. Terminal and unknown tasks
    /// return `false`.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(record) = registry.get_mut(task_id) else {
            return false;
        };

        match record.task.status {
            TaskStatus::Queued => {
                record.task.status = TaskStatus::Cancelled;
                record.task.error = Some("cancelled before execution".to_string());
                let _ = record.status_tx.send(TaskStatus::Cancelled);
                tracing::debug!(task_id, "queued task cancelled");
                true
            }
            TaskStatus::Running => {
                record.cancel_requested = true;
                tracing::debug!(task_id, "running task signaled for cancellation");
                true
            }
            _ => false,
        }
    }

    /// Block until the task reaches a terminal state, then return it.
    ///
    /// Callers polling `status` instead must treat anything non-terminal as
    /// "still running" and apply their own backoff; no push notification is
    /// part of the contract.
    pub async fn wait(&self, task_id: &str) -> Result<Task> {
        let mut status_rx = {
            let registry = self.registry.read().await;
            let record = registry
                .get(task_id)
                .ok_or_else(|| HazardScopeError::TaskNotFound(task_id.to_string()))?;
            record.status_tx.subscribe()
        };

        loop {
            if status_rx.borrow_and_update().is_terminal() {
                return self.status(task_id).await;
            }
            if status_rx.changed().await.is_err() {
                // Sender dropped with the record; report whatever is left
                return self.status(task_id).await;
            }
        }
    }

    /// Abort all workers. In-flight tasks are dropped mid-execution.
    pub fn shutdown(&self) {
        for handle in &self.worker_handles {
            handle.abort();
        }
    }
}

fn attempt_timeout(kind: TaskKind, config: &QueueConfig) -> Duration {
    let secs = match kind {
        TaskKind::ImageAnalysis => config.image_analysis_timeout_secs,
        TaskKind::AnswerGeneration => config.answer_generation_timeout_secs,
        TaskKind::FullQuery => config.full_query_timeout_secs,
    };
    Duration::from_secs(secs)
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    registry: Registry,
    executor: Arc<dyn TaskExecutor>,
    config: QueueConfig,
) {
    loop {
        let task_id = {
            let mut receiver = receiver.lock().await;
            match receiver.recv().await {
                Some(id) => id,
                None => break,
            }
        };

        // Claim the task; skip anything cancelled while it sat in the queue
        let (kind, payload) = {
            let mut registry = registry.write().await;
            let Some(record) = registry.get_mut(&task_id) else {
                continue;
            };
            match record.task.status {
                TaskStatus::Queued => {
                    record.task.status = TaskStatus::Running;
                    record.task.progress = 0;
                    let _ = record.status_tx.send(TaskStatus::Running);
                    (record.task.kind, record.payload.clone())
                }
                _ => continue,
            }
        };

        tracing::debug!(worker_id, task_id = %task_id, ?kind, "task claimed");

        let timeout = attempt_timeout(kind, &config);
        let progress = ProgressHandle {
            registry: registry.clone(),
            task_id: task_id.clone(),
        };

        let budget = config.retry_budget.max(1);
        let mut last_error = String::new();
        let mut outcome = None;
        let mut cancelled = false;

        for attempt in 1..=budget {
            {
                let mut registry = registry.write().await;
                if let Some(record) = registry.get_mut(&task_id) {
                    record.task.attempt_count = attempt;
                }
            }

            match tokio::time::timeout(timeout, executor.execute(kind, &payload, &progress)).await
            {
                Ok(Ok(value)) => {
                    outcome = Some(value);
                    break;
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        task_id = %task_id,
                        attempt,
                        error = %last_error,
                        "task attempt failed"
                    );
                    // Caller errors cannot be fixed by retrying
                    if e.is_structural() {
                        break;
                    }
                }
                Err(_) => {
                    last_error = format!("attempt timed out after {}s", timeout.as_secs());
                    tracing::warn!(task_id = %task_id, attempt, "task attempt timed out");
                }
            }

            // Best-effort cancellation, observed between attempts
            let requested = {
                let registry = registry.read().await;
                registry
                    .get(&task_id)
                    .map(|record| record.cancel_requested)
                    .unwrap_or(false)
            };
            if requested {
                cancelled = true;
                break;
            }
        }

        let mut registry = registry.write().await;
        let Some(record) = registry.get_mut(&task_id) else {
            continue;
        };

        if let Some(value) = outcome {
            record.task.status = TaskStatus::Finished;
            record.task.progress = 100;
            record.task.result = Some(value);
            record.task.error = None;
            let _ = record.status_tx.send(TaskStatus::Finished);
            tracing::debug!(task_id = %task_id, "task finished");
        } else if cancelled {
            record.task.status = TaskStatus::Cancelled;
            record.task.error = Some(if last_error.is_empty() {
                "cancelled".to_string()
            } else {
                last_error
            });
            let _ = record.status_tx.send(TaskStatus::Cancelled);
            tracing::debug!(task_id = %task_id, "task cancelled mid-run");
        } else {
            record.task.status = TaskStatus::Failed;
            record.task.error = Some(last_error);
            let _ = record.status_tx.send(TaskStatus::Failed);
            tracing::warn!(task_id = %task_id, "task failed after retry budget");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(workers: usize, retry_budget: u32) -> QueueConfig {
        QueueConfig {
            workers,
            retry_budget,
            ..QueueConfig::default()
        }
    }

    /// Echoes its payload back
    struct EchoExecutor;

    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(
            &self,
            _kind: TaskKind,
            payload: &Value,
            progress: &ProgressHandle,
        ) -> Result<Value> {
            progress.set(50).await;
            Ok(payload.clone())
        }
    }

    /// Fails every attempt with a numbered message
    struct AlwaysFails {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl TaskExecutor for AlwaysFails {
        async fn execute(
            &self,
            _kind: TaskKind,
            _payload: &Value,
            _progress: &ProgressHandle,
        ) -> Result<Value> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Err(HazardScopeError::ExternalError(format!(
                "provider unreachable (attempt {})",
                n
            )))
        }
    }

    /// Records the order in which payloads were executed
    struct OrderRecorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl TaskExecutor for OrderRecorder {
        async fn execute(
            &self,
            _kind: TaskKind,
            payload: &Value,
            _progress: &ProgressHandle,
        ) -> Result<Value> {
            self.seen.lock().await.push(payload["n"].as_i64().unwrap_or(-1));
            Ok(Value::Null)
        }
    }

    /// Blocks until released, so queued tasks can be manipulated in tests
    struct GatedExecutor {
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl TaskExecutor for GatedExecutor {
        async fn execute(
            &self,
            _kind: TaskKind,
            _payload: &Value,
            _progress: &ProgressHandle,
        ) -> Result<Value> {
            let _permit = self.gate.acquire().await.map_err(|_| {
                HazardScopeError::ExternalError("gate closed".to_string())
            })?;
            Ok(json!({"released": true}))
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_wait_returns_result() {
        let queue = TaskQueue::start(config(2, 3), Arc::new(EchoExecutor));
        let task_id = queue
            .enqueue(TaskKind::FullQuery, json!({"query": "cracked wall"}))
            .await
            .unwrap();

        let task = queue.wait(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.progress, 100);
        assert_eq!(task.result.unwrap()["query"], "cracked wall");
        assert_eq!(task.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_status_is_idempotent_after_finish() {
        let queue = TaskQueue::start(config(1, 3), Arc::new(EchoExecutor));
        let task_id = queue
            .enqueue(TaskKind::FullQuery, json!({"n": 1}))
            .await
            .unwrap();
        queue.wait(&task_id).await.unwrap();

        let first = queue.status(&task_id).await.unwrap();
        let second = queue.status(&task_id).await.unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.result, second.result);
        assert_eq!(first.attempt_count, second.attempt_count);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let queue = TaskQueue::start(config(1, 3), Arc::new(EchoExecutor));
        let err = queue.status("missing").await.unwrap_err();
        assert!(matches!(err, HazardScopeError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_single_worker_preserves_fifo_order() {
        let recorder = Arc::new(OrderRecorder {
            seen: Mutex::new(Vec::new()),
        });
        let queue = TaskQueue::start(config(1, 1), recorder.clone());

        let mut ids = Vec::new();
        for n in 0..8 {
            ids.push(
                queue
                    .enqueue(TaskKind::FullQuery, json!({ "n": n }))
                    .await
                    .unwrap(),
            );
        }
        for id in &ids {
            queue.wait(id).await.unwrap();
        }

        let seen = recorder.seen.lock().await.clone();
        assert_eq!(seen, (0..8).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_surfaces_last_error() {
        let executor = Arc::new(AlwaysFails {
            attempts: AtomicU32::new(0),
        });
        let queue = TaskQueue::start(config(1, 3), executor.clone());

        let task_id = queue
            .enqueue(TaskKind::ImageAnalysis, json!({}))
            .await
            .unwrap();
        let task = queue.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempt_count, 3);
        assert_eq!(executor.attempts.load(Ordering::SeqCst), 3);
        // The last attempt's error is recorded verbatim
        assert!(task
            .error
            .unwrap()
            .contains("provider unreachable (attempt 3)"));
    }

    /// Structural errors are caller mistakes; retrying cannot help
    struct StructuralFailure {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl TaskExecutor for StructuralFailure {
        async fn execute(
            &self,
            _kind: TaskKind,
            _payload: &Value,
            _progress: &ProgressHandle,
        ) -> Result<Value> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(HazardScopeError::SessionExpired("gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_structural_errors_are_not_retried() {
        let executor = Arc::new(StructuralFailure {
            attempts: AtomicU32::new(0),
        });
        let queue = TaskQueue::start(config(1, 3), executor.clone());

        let task_id = queue
            .enqueue(TaskKind::AnswerGeneration, json!({}))
            .await
            .unwrap();
        let task = queue.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(executor.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_queued_task_before_claim() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let queue = TaskQueue::start(config(1, 1), Arc::new(GatedExecutor { gate: gate.clone() }));

        // The single worker is stuck on the first task
        let blocker = queue.enqueue(TaskKind::FullQuery, json!({})).await.unwrap();
        let victim = queue.enqueue(TaskKind::FullQuery, json!({})).await.unwrap();

        // Give the worker a chance to claim the blocker
        tokio::task::yield_now().await;

        assert!(queue.cancel(&victim).await);
        let task = queue.status(&victim).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);

        // Cancelling again is a no-op on a terminal task
        assert!(!queue.cancel(&victim).await);

        gate.add_permits(8);
        let blocker_task = queue.wait(&blocker).await.unwrap();
        assert_eq!(blocker_task.status, TaskStatus::Finished);

        // The worker skipped the cancelled task entirely
        let task = queue.status(&victim).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_against_retry_budget() {
        /// Sleeps far past the attempt timeout
        struct Sleeper;

        #[async_trait]
        impl TaskExecutor for Sleeper {
            async fn execute(
                &self,
                _kind: TaskKind,
                _payload: &Value,
                _progress: &ProgressHandle,
            ) -> Result<Value> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
        }

        let config = QueueConfig {
            workers: 1,
            retry_budget: 2,
            image_analysis_timeout_secs: 5,
            ..QueueConfig::default()
        };
        let queue = TaskQueue::start(config, Arc::new(Sleeper));

        let task_id = queue
            .enqueue(TaskKind::ImageAnalysis, json!({}))
            .await
            .unwrap();
        let task = queue.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempt_count, 2);
        assert!(task.error.unwrap().contains("timed out"));
    }
}
