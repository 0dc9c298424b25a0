//! Bounded poll loop for pending replies.
//!
//! Sleeps before every attempt, never backs off, and treats transport errors as "not yet".

use async_trait::async_trait;
use std::time::Duration;

use super::ClientError;
use crate::pending::PendingReply;

/// Default spacing between attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default attempt budget (30 x 1 s).
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// Something that can be asked for a session's pending reply.
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// `Ok(None)` while the reply is still in flight.
    async fn fetch_reply(&self, session_id: &str) -> Result<Option<PendingReply>, ClientError>;
}

/// Waits between attempts. Injected so tests need no wall-clock time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Replied(PendingReply),
    TimedOut,
}

pub struct Poller<S = TokioSleeper> {
    interval: Duration,
    max_attempts: u32,
    sleeper: S,
}

impl Default for Poller<TokioSleeper> {
    fn default() -> Self {
        Self::new(POLL_INTERVAL, MAX_POLL_ATTEMPTS, TokioSleeper)
    }
}

impl<S: Sleeper> Poller<S> {
    pub fn new(interval: Duration, max_attempts: u32, sleeper: S) -> Self {
        Self {
            interval,
            max_attempts,
            sleeper,
        }
    }

    /// Poll until a reply arrives or the attempt budget is spent.
    pub async fn poll<R: ReplySource + ?Sized>(&self, source: &R, session_id: &str) -> PollOutcome {
        for attempt in 1..=self.max_attempts {
            self.sleeper.sleep(self.interval).await;
            match source.fetch_reply(session_id).await {
                Ok(Some(reply)) => {
                    log::debug!("reply for session {} after {} polls", session_id, attempt);
                    return PollOutcome::Replied(reply);
                }
                Ok(None) => {}
                Err(e) => log::debug!("poll {} for session {} failed: {}", attempt, session_id, e),
            }
        }
        log::info!(
            "no reply for session {} after {} polls",
            session_id,
            self.max_attempts
        );
        PollOutcome::TimedOut
    }
}
