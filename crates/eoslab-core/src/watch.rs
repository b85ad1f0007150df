//! Awaiting host tasks until each reaches a terminal state.

use std::collections::HashSet;

use eoslab_vim::{Hypervisor, TaskHandle, TaskState};

use crate::error::{ProvisionError, Result};

/// Block until every task in the set is terminal, failing fast on the first
/// error.
///
/// Registers a change-notification filter over the tasks, then repeatedly
/// suspends on the host's update stream. That is the single suspension
/// point; there is no interval polling. A task reaching `Success` shrinks the pending
/// set; the first task reporting `Error` aborts the wait with the host's
/// failure detail, abandoning still-pending siblings (no host-side
/// cancellation is attempted). The filter is released on every exit path.
pub async fn wait_for_tasks(host: &dyn Hypervisor, tasks: &[TaskHandle]) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let filter = host.create_task_filter(tasks).await?;
    let result = drain_pending(host, tasks).await;
    // The subscription must not outlive the call, success or failure.
    if let Err(e) = host.destroy_filter(filter).await {
        tracing::warn!(error = %e, "failed to release task update filter");
    }
    result
}

async fn drain_pending(host: &dyn Hypervisor, tasks: &[TaskHandle]) -> Result<()> {
    let mut pending: HashSet<&str> = tasks.iter().map(TaskHandle::id).collect();
    let mut cursor: Option<String> = None;

    while !pending.is_empty() {
        let batch = host.wait_for_updates(cursor.as_deref()).await?;
        for change in &batch.changes {
            if !pending.contains(change.task.id()) {
                continue;
            }
            match change.state {
                TaskState::Success => {
                    tracing::debug!(task = %change.task, "task completed");
                    pending.remove(change.task.id());
                }
                TaskState::Error => {
                    // Fail fast: remaining notifications in this batch are
                    // not processed.
                    return Err(ProvisionError::Task {
                        task: change.task.id().to_string(),
                        detail: change
                            .detail
                            .clone()
                            .unwrap_or_else(|| "task reported error without detail".to_string()),
                    });
                }
                TaskState::Queued | TaskState::Running => {}
            }
        }
        cursor = Some(batch.version.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eoslab_vim::{MockHost, TaskChange, UpdateBatch};

    fn task(n: usize) -> TaskHandle {
        TaskHandle::new(format!("haTask-{n}"))
    }

    fn change(n: usize, state: TaskState, detail: Option<&str>) -> TaskChange {
        TaskChange {
            task: task(n),
            state,
            detail: detail.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn empty_task_set_returns_immediately() {
        let host = MockHost::new();
        wait_for_tasks(&host, &[]).await.unwrap();
        assert_eq!(host.await_cycles(), 0);
    }

    #[tokio::test]
    async fn waits_across_batches_until_all_succeed() {
        let host = MockHost::new();
        host.push_update(UpdateBatch {
            version: "1".into(),
            changes: vec![
                change(1, TaskState::Running, None),
                change(1, TaskState::Success, None),
            ],
        });
        host.push_update(UpdateBatch {
            version: "2".into(),
            changes: vec![change(2, TaskState::Success, None)],
        });
        wait_for_tasks(&host, &[task(1), task(2)]).await.unwrap();
        assert_eq!(host.filters_outstanding(), 0);
    }

    #[tokio::test]
    async fn first_error_aborts_with_host_detail() {
        let host = MockHost::new();
        // two successes, then task 3 errors, task 4 left pending
        host.push_update(UpdateBatch {
            version: "1".into(),
            changes: vec![
                change(1, TaskState::Success, None),
                change(2, TaskState::Success, None),
                change(3, TaskState::Error, Some("insufficient resources")),
                change(4, TaskState::Success, None),
            ],
        });
        let err = wait_for_tasks(&host, &[task(1), task(2), task(3), task(4)])
            .await
            .unwrap_err();
        match err {
            ProvisionError::Task { task, detail } => {
                assert_eq!(task, "haTask-3");
                assert_eq!(detail, "insufficient resources");
            }
            other => panic!("expected Task error, got {other}"),
        }
        // filter released on the failure path too
        assert_eq!(host.filters_outstanding(), 0);
    }

    #[tokio::test]
    async fn error_without_detail_gets_placeholder() {
        let host = MockHost::new();
        host.push_update(UpdateBatch {
            version: "1".into(),
            changes: vec![change(1, TaskState::Error, None)],
        });
        let err = wait_for_tasks(&host, &[task(1)]).await.unwrap_err();
        assert!(err.to_string().contains("without detail"));
    }

    #[tokio::test]
    async fn changes_for_unknown_tasks_are_ignored() {
        let host = MockHost::new();
        host.push_update(UpdateBatch {
            version: "1".into(),
            changes: vec![
                change(99, TaskState::Error, Some("someone else's failure")),
                change(1, TaskState::Success, None),
            ],
        });
        wait_for_tasks(&host, &[task(1)]).await.unwrap();
    }
}
