//! Wrapper for operations whose failure must never propagate
//!
//! Used for auxiliary data fetches, teardown cleanup and publish-and-forget
//! maintenance. Failures are logged at a severity the caller picks.

use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warn,
}

/// Await `operation`, logging and swallowing its error.
pub async fn best_effort<T, E, F>(label: &str, severity: Severity, operation: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match operation.await {
        Ok(value) => Some(value),
        Err(e) => {
            match severity {
                Severity::Debug => debug!("{} failed (ignored): {}", label, e),
                Severity::Warn => warn!("{} failed (ignored): {}", label, e),
            }
            None
        }
    }
}
