//! Launch-all / join-all task harness.
//!
//! Every future runs as its own tokio task. The caller gets exactly one
//! outcome per submitted future, in submission order, once every task has
//! finished. A panicking task becomes a [`TaskFailure`] for its slot and
//! never disturbs its siblings.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Why a task produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// The task panicked; carries the panic message
    Panicked(String),
    /// The task was cancelled before finishing
    Cancelled,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFailure::Panicked(msg) => write!(f, "task panicked: {}", msg),
            TaskFailure::Cancelled => f.write_str("task cancelled"),
        }
    }
}

/// Run `futures` concurrently and wait for all of them.
///
/// With `limit`, at most that many run at the same time; the rest wait
/// for a permit.
pub async fn join_ordered<F, T>(
    futures: impl IntoIterator<Item = F>,
    limit: Option<usize>,
) -> Vec<Result<T, TaskFailure>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut set = JoinSet::new();
    let mut submitted = 0usize;

    for (index, fut) in futures.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = match semaphore {
                Some(s) => match s.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return (index, Err(TaskFailure::Cancelled)),
                },
                None => None,
            };
            let outcome = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .map_err(|payload| TaskFailure::Panicked(panic_message(payload.as_ref())));
            (index, outcome)
        });
        submitted += 1;
    }

    let mut slots: Vec<Option<Result<T, TaskFailure>>> = (0..submitted).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::warn!("Fan-out task did not complete: {}", e),
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(TaskFailure::Cancelled)))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
