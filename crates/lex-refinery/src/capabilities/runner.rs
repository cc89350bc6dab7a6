//! Call policy for enrichment capabilities.
//!
//! [`CapabilityRunner`] owns a private tokio runtime. Each capability call runs
//! on the blocking pool under a per-call timeout, is retried a bounded number
//! of times with a fixed backoff, and batches run with bounded parallelism.
//! Results come back in input order regardless of completion order.
//!
//! Calls are synchronous from the caller's point of view. When the caller is
//! itself inside a tokio runtime, the batch is driven from a helper thread so
//! the private runtime is never nested in the ambient one.

use super::CapabilityError;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Timeout, retry and concurrency limits for capability calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
    /// Calls in flight at once within a batch.
    pub max_concurrency: usize,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff: Duration::from_millis(250),
            max_concurrency: 4,
        }
    }
}

/// Executes capability calls under a [`CapabilityPolicy`].
pub struct CapabilityRunner {
    policy: CapabilityPolicy,
    runtime: Option<Runtime>,
}

static_assertions::assert_impl_all!(CapabilityRunner: Send, Sync);

impl CapabilityRunner {
    /// Create a runner with its own runtime.
    pub fn new(policy: CapabilityPolicy) -> Result<Self, CapabilityError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .thread_name("lex-refinery-capability")
            .build()
            .map_err(|e| CapabilityError::Failed(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            policy,
            runtime: Some(runtime),
        })
    }

    pub fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    /// Run a single call under the policy.
    pub fn call<T, F>(&self, call: F) -> Result<T, CapabilityError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, CapabilityError> + Send + Sync + 'static,
    {
        self.call_batch(vec![call])
            .pop()
            .unwrap_or_else(|| Err(CapabilityError::Failed("no result produced".to_string())))
    }

    /// Run many calls with bounded parallelism.
    ///
    /// The returned vector has one entry per input call, in input order.
    pub fn call_batch<T, F>(&self, calls: Vec<F>) -> Vec<Result<T, CapabilityError>>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, CapabilityError> + Send + Sync + 'static,
    {
        let total = calls.len();
        let Some(runtime) = self.runtime.as_ref() else {
            return (0..total)
                .map(|_| Err(CapabilityError::Failed("runner is shut down".to_string())))
                .collect();
        };
        let policy = self.policy;
        let drive = move || runtime.block_on(run_batch(calls, policy));

        if Handle::try_current().is_err() {
            return drive();
        }

        debug!("Called from inside an async runtime, driving batch from a helper thread");
        std::thread::scope(|scope| scope.spawn(drive).join()).unwrap_or_else(|_| {
            (0..total)
                .map(|_| Err(CapabilityError::Failed("capability batch thread panicked".to_string())))
                .collect()
        })
    }
}

impl Drop for CapabilityRunner {
    fn drop(&mut self) {
        // Timed-out calls may still be parked on the blocking pool.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Run `calls` concurrently, at most `policy.max_concurrency` at a time.
async fn run_batch<T, F>(calls: Vec<F>, policy: CapabilityPolicy) -> Vec<Result<T, CapabilityError>>
where
    T: Send + 'static,
    F: Fn() -> Result<T, CapabilityError> + Send + Sync + 'static,
{
    let total = calls.len();
    let semaphore = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, call) in calls.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let call = Arc::new(call);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, call_with_policy(call, policy).await)
        });
    }

    let mut results: Vec<Option<Result<T, CapabilityError>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!("Capability task aborted: {}", e),
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(CapabilityError::Failed("task aborted".to_string()))))
        .collect()
}

async fn call_with_policy<T, F>(call: Arc<F>, policy: CapabilityPolicy) -> Result<T, CapabilityError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, CapabilityError> + Send + Sync + 'static,
{
    let mut attempt: u32 = 0;
    loop {
        let task = {
            let call = Arc::clone(&call);
            tokio::task::spawn_blocking(move || call())
        };

        let outcome = match tokio::time::timeout(policy.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CapabilityError::Failed(format!(
                "capability panicked: {}",
                join_error
            ))),
            Err(_) => Err(CapabilityError::Timeout),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                debug!("Capability attempt {} failed ({}), retrying", attempt, e);
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> CapabilityPolicy {
        CapabilityPolicy {
            timeout: Duration::from_millis(200),
            max_retries: 2,
            backoff: Duration::from_millis(1),
            max_concurrency: 2,
        }
    }

    #[test]
    fn test_call_success() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let result = runner.call(|| Ok::<_, CapabilityError>(21 * 2));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_call_retries_then_succeeds() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result = runner.call(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CapabilityError::Failed("flaky".to_string()))
            } else {
                Ok("done")
            }
        });

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_call_gives_up_after_max_retries() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), _> = runner.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CapabilityError::Failed("down".to_string()))
        });

        assert!(matches!(result, Err(CapabilityError::Failed(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_response_not_retried() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), _> = runner.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CapabilityError::InvalidResponse("nonsense".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_call_from_inside_async_runtime() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let calls: Vec<_> = (1..=3)
            .map(|n| move || Ok::<_, CapabilityError>(n * 10))
            .collect();
        let results = runner.call_batch(calls);
        assert_eq!(results, vec![Ok(10), Ok(20), Ok(30)]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_call_from_current_thread_runtime() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        assert_eq!(runner.call(|| Ok::<_, CapabilityError>("ok")), Ok("ok"));
    }

    #[test]
    fn test_call_times_out() {
        let policy = CapabilityPolicy {
            timeout: Duration::from_millis(20),
            max_retries: 0,
            ..fast_policy()
        };
        let runner = CapabilityRunner::new(policy).unwrap();

        let result = runner.call(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, CapabilityError>(())
        });

        assert_eq!(result, Err(CapabilityError::Timeout));
    }

    #[test]
    fn test_batch_preserves_order_and_isolates_failures() {
        let runner = CapabilityRunner::new(fast_policy()).unwrap();
        let calls: Vec<_> = (0..6)
            .map(|i| {
                move || {
                    if i == 3 {
                        Err(CapabilityError::InvalidResponse("bad".to_string()))
                    } else {
                        std::thread::sleep(Duration::from_millis((6 - i) as u64));
                        Ok(i * 10)
                    }
                }
            })
            .collect();

        let results = runner.call_batch(calls);

        assert_eq!(results.len(), 6);
        assert_eq!(results[0], Ok(0));
        assert_eq!(results[2], Ok(20));
        assert!(results[3].is_err());
        assert_eq!(results[5], Ok(50));
    }
}
