//! Join a fixed set of operations without short-circuiting.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures_util::FutureExt;

/// How a single settled operation ended.
#[derive(Debug)]
pub enum Outcome<T, E> {
    Ok(T),
    Err(E),
    Panicked(String),
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

/// Result of one named operation.
#[derive(Debug)]
pub struct Settled<T, E> {
    pub name: &'static str,
    pub outcome: Outcome<T, E>,
}

/// Box a named operation for [`settle_all`].
pub fn op<'a, T, E, F>(name: &'static str, fut: F) -> (&'static str, BoxFuture<'a, Result<T, E>>)
where
    F: Future<Output = Result<T, E>> + Send + 'a,
{
    (name, fut.boxed())
}

/// Run every operation concurrently and wait for all of them.
///
/// A failure or panic in one operation never cancels the others. Each
/// outcome is logged individually and returned in input order.
pub async fn settle_all<'a, T, E>(
    ops: Vec<(&'static str, BoxFuture<'a, Result<T, E>>)>,
) -> Vec<Settled<T, E>>
where
    T: std::fmt::Debug,
    E: Display,
{
    let runs = ops.into_iter().map(|(name, fut)| async move {
        let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => Outcome::Ok(value),
            Ok(Err(e)) => Outcome::Err(e),
            Err(panic) => Outcome::Panicked(
                panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string()),
            ),
        };
        Settled { name, outcome }
    });

    let settled = futures::future::join_all(runs).await;

    for s in &settled {
        match &s.outcome {
            Outcome::Ok(value) => tracing::debug!(operation = s.name, result = ?value, "Operation succeeded"),
            Outcome::Err(e) => tracing::warn!(operation = s.name, error = %e, "Operation failed"),
            Outcome::Panicked(msg) => tracing::error!(operation = s.name, panic = %msg, "Operation panicked"),
        }
    }

    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_failure_does_not_cancel_sibling() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let settled = settle_all(vec![
            op("fails", async { Err::<u32, String>("boom".into()) }),
            op("slow", async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(2)
            }),
        ])
        .await;

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(settled[0].name, "fails");
        assert!(matches!(&settled[0].outcome, Outcome::Err(e) if e == "boom"));
        assert!(matches!(settled[1].outcome, Outcome::Ok(2)));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        async fn explode() -> Result<u32, String> {
            panic!("kaboom")
        }

        let settled = settle_all(vec![op("explodes", explode()), op("ok", async { Ok(1) })]).await;

        assert!(matches!(&settled[0].outcome, Outcome::Panicked(msg) if msg == "kaboom"));
        assert!(settled[1].outcome.is_ok());
    }

    #[test]
    fn test_empty_set_settles() {
        let settled: Vec<Settled<(), String>> = tokio_test::block_on(settle_all(Vec::new()));
        assert!(settled.is_empty());
    }
}
