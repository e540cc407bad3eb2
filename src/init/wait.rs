// SPDX-License-Identifier: Apache-2.0

use tokio::task::JoinSet;
use tower::BoxError;
use tracing::error;

/// Wait for the first task in the set to finish and return its result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<Result<(), BoxError>>) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

/// Wait for every remaining task. The last task error is returned; tasks that
/// panicked or were aborted are logged.
pub async fn wait_for_all_tasks(tasks: &mut JoinSet<Result<(), BoxError>>) -> Result<(), BoxError> {
    let mut result = Ok(());
    while let Some(v) = tasks.join_next().await {
        match v {
            Ok(Ok(())) => {}
            Ok(Err(e)) => result = Err(e),
            Err(e) => error!("Failed to join with task: {:?}", e),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_task_returns_first_result() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async { Err("agent failed".into()) });
        tasks.spawn(std::future::pending());

        let res = wait_for_any_task(&mut tasks).await;
        assert_eq!(res.unwrap_err().to_string(), "agent failed");
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_all_tasks_keeps_error() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err("bad".into()) });

        assert!(wait_for_all_tasks(&mut tasks).await.is_err());
        assert!(wait_for_all_tasks(&mut tasks).await.is_ok());
    }
}
