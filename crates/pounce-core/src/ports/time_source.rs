//! TimeSource port - authoritative reference time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::TimeQueryError;

/// Asks one time server for the current reference time.
///
/// Callers bound the query with their own timeout; implementations may add
/// a tighter one.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn query(&self, server: &str) -> Result<DateTime<Utc>, TimeQueryError>;
}
