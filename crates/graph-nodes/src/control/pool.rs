//! Fan-out of execution branches onto forked execution states

use std::sync::{Arc, Weak};

use graph_runtime::node::{dispatch, ExecutionTarget};
use graph_runtime::{
    concurrency_enabled, ExecutionState, Node, Result, RuntimeError, HINT_INTERNAL_ERROR,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Strong handle of a node to itself, needed to record it as the creator of
/// forked states
pub(crate) fn upgrade_self<T: Node>(this: &Weak<T>, state: &ExecutionState) -> Result<Arc<dyn Node>> {
    match this.upgrade() {
        Some(node) => Ok(node as Arc<dyn Node>),
        None => Err(RuntimeError::leaf(Some(state), "node was dropped while executing")
            .with_hint(HINT_INTERNAL_ERROR)),
    }
}

/// One unit of concurrent work: an execution edge to follow on its own state
pub(crate) struct Branch {
    pub state: Arc<ExecutionState>,
    pub target: ExecutionTarget,
}

/// Run `branches` with at most `workers` of them in flight and return how
/// many were started.
///
/// Branches are pulled from the iterator only once a worker is free, so
/// forking a state for a branch happens no earlier than its start. A failing
/// branch, or an error while building one, cancels `parent`. No further
/// branch is pulled after that. `workers == 0` puts no bound on the number
/// of branches in flight. With concurrency disabled the branches run one
/// after the other on the calling task. Every error is returned, joined if
/// there are several.
pub(crate) async fn run_branches<I>(
    parent: &Arc<ExecutionState>,
    branches: I,
    workers: usize,
) -> Result<usize>
where
    I: IntoIterator<Item = Result<Branch>>,
    I::IntoIter: Send,
{
    let mut branches = branches.into_iter();

    if !concurrency_enabled() || workers == 1 {
        return run_sequential(parent, branches).await;
    }

    let semaphore = (workers > 0).then(|| Arc::new(Semaphore::new(workers)));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    let mut errors = Vec::new();
    let mut started = 0;

    loop {
        if parent.is_cancelled() {
            break;
        }

        let permit = match &semaphore {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| RuntimeError::leaf(Some(parent), format!("worker pool closed: {}", e)))?,
            ),
            None => None,
        };

        // a branch may have failed while we waited for the permit
        if parent.is_cancelled() {
            break;
        }

        let branch = match branches.next() {
            Some(Ok(branch)) => branch,
            Some(Err(e)) => {
                parent.cancel();
                errors.push(e);
                break;
            }
            None => break,
        };

        started += 1;
        let parent = Arc::clone(parent);
        tasks.spawn(async move {
            let _permit = permit;
            let result = dispatch(branch.target, branch.state, None).await;
            if result.is_err() {
                parent.cancel();
            }
            result
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => {
                parent.cancel();
                errors.push(RuntimeError::leaf(
                    Some(parent),
                    format!("concurrent branch did not finish: {}", e),
                ));
            }
        }
    }

    match RuntimeError::join(errors) {
        Some(err) => Err(err),
        None => Ok(started),
    }
}

async fn run_sequential<I>(parent: &Arc<ExecutionState>, mut branches: I) -> Result<usize>
where
    I: Iterator<Item = Result<Branch>> + Send,
{
    let mut errors = Vec::new();
    let mut started = 0;
    while !parent.is_cancelled() {
        let branch = match branches.next() {
            Some(Ok(branch)) => branch,
            Some(Err(e)) => {
                parent.cancel();
                errors.push(e);
                break;
            }
            None => break,
        };

        started += 1;
        if let Err(e) = dispatch(branch.target, branch.state, None).await {
            parent.cancel();
            errors.push(e);
        }
    }

    match RuntimeError::join(errors) {
        Some(err) => Err(err),
        None => Ok(started),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_runtime::StateOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cancelled_parent_pulls_no_branch() {
        for workers in [0, 1, 4] {
            let parent = ExecutionState::new(StateOptions::default());
            parent.cancel();

            let pulled = AtomicUsize::new(0);
            let branches = std::iter::from_fn(|| {
                pulled.fetch_add(1, Ordering::SeqCst);
                None::<Result<Branch>>
            });

            let started = run_branches(&parent, branches, workers).await.unwrap();
            assert_eq!(started, 0);
            assert_eq!(pulled.load(Ordering::SeqCst), 0, "workers = {}", workers);
        }
    }

    #[tokio::test]
    async fn test_build_error_stops_pulling() {
        for workers in [0, 1, 4] {
            let parent = ExecutionState::new(StateOptions::default());

            let pulled = AtomicUsize::new(0);
            let branches = std::iter::from_fn(|| {
                pulled.fetch_add(1, Ordering::SeqCst);
                Some(Err::<Branch, _>(RuntimeError::msg("bad element")))
            });

            let err = run_branches(&parent, branches, workers).await.unwrap_err();
            assert_eq!(err.to_string(), "bad element");
            assert!(parent.is_cancelled());
            assert_eq!(pulled.load(Ordering::SeqCst), 1, "workers = {}", workers);
        }
    }

    #[tokio::test]
    async fn test_no_branches() {
        let parent = ExecutionState::new(StateOptions::default());
        let started = run_branches(&parent, std::iter::empty(), 0).await.unwrap();
        assert_eq!(started, 0);
        assert!(!parent.is_cancelled());
    }
}
