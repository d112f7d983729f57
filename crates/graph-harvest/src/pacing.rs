//! Randomized, cancellation-aware pauses.
//!
//! Every inter-page jitter, every post-scroll wait, and every inter-action
//! delay goes through a [`Pacer`]. The sleep itself sits behind the
//! [`Sleeper`] trait so tests can observe delays without waiting them out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{StrategyError, StrategyResult};
use crate::types::DelayRange;

/// The job was cancelled while waiting.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interrupted by cancellation")]
pub struct Interrupted;

/// Something that can suspend the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping via tokio's timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Draws delays from a range and sleeps them, racing the cancellation token.
#[derive(Clone)]
pub struct Pacer {
    sleeper: Arc<dyn Sleeper>,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Arc::new(TokioSleeper))
    }
}

impl Pacer {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Uniform draw within `range`, millisecond resolution.
    pub fn draw(range: &DelayRange) -> Duration {
        let min = range.min.as_millis() as u64;
        let max = range.max.as_millis() as u64;
        if max <= min {
            return range.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Sleep a random duration from `range`. Returns the drawn duration.
    pub async fn pause(
        &self,
        range: &DelayRange,
        cancel: &CancellationToken,
    ) -> Result<Duration, Interrupted> {
        let d = Self::draw(range);
        self.wait(d, cancel).await.map(|()| d)
    }

    /// Uninterruptible short wait inside a single surface interaction
    /// (e.g. between opening a menu and confirming it).
    pub async fn settle(&self, range: &DelayRange) -> Duration {
        let d = Self::draw(range);
        self.sleeper.sleep(d).await;
        d
    }

    /// Sleep exactly `duration` unless cancelled first.
    pub async fn wait(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupted),
            _ = self.sleeper.sleep(duration) => Ok(()),
        }
    }
}

/// Race `fut` against the job's cancellation token.
pub async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = StrategyResult<T>>,
) -> StrategyResult<T> {
    if cancel.is_cancelled() {
        return Err(StrategyError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StrategyError::Cancelled),
        r = fut => r,
    }
}
