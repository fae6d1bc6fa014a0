use std::time::Duration;
use tracing::debug;

use crate::airplay::{ProgressHandle, Session};
use crate::config::PlaybackConfig;
use crate::error::TransportError;

/// Result of waiting on a streamed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// The receiver reported a duration and we slept through it
    Played(Duration),
    /// No positive duration after every attempt; nothing was slept for the item
    Unknown,
}

/// Bounded-retry poller that blocks for as long as a streamed item plays
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    attempts: u32,
    retry_delay: Duration,
}

impl ProgressMonitor {
    pub fn new(attempts: u32, retry_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.progress_attempts, config.progress_retry())
    }

    /// Ask the receiver for the item's duration and sleep for it.
    ///
    /// Sleeps `retry_delay` between attempts, but not after the last one.
    /// Query failures propagate to the caller.
    pub async fn wait_while_playing<S>(
        &self,
        session: &mut S,
        handle: ProgressHandle,
    ) -> Result<ProgressOutcome, TransportError>
    where
        S: Session + ?Sized,
    {
        for attempt in 1..=self.attempts {
            if let Some(duration) = session.query_progress(handle).await? {
                debug!("Got playback duration {:?} on try {}", duration, attempt);
                tokio::time::sleep(duration).await;
                return Ok(ProgressOutcome::Played(duration));
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Ok(ProgressOutcome::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airplay::ImagePayload;
    use crate::database::Transition;
    use async_trait::async_trait;
    use tokio::time::Instant;

    /// Reports no duration until `known_after` queries have been made
    struct ScriptedSession {
        queries: u32,
        known_after: Option<u32>,
        duration: Duration,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn send_video(&mut self, _: &str) -> Result<ProgressHandle, TransportError> {
            Ok(ProgressHandle(1))
        }

        async fn send_audio(&mut self, _: &str) -> Result<ProgressHandle, TransportError> {
            Ok(ProgressHandle(1))
        }

        async fn send_image(&mut self, _: ImagePayload, _: Transition) -> Result<(), TransportError> {
            Ok(())
        }

        async fn query_progress(
            &mut self,
            _: ProgressHandle,
        ) -> Result<Option<Duration>, TransportError> {
            self.queries += 1;
            match self.known_after {
                Some(n) if self.queries >= n => Ok(Some(self.duration)),
                _ => Ok(None),
            }
        }

        async fn stop(&mut self, _: ProgressHandle) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_five_attempts() {
        let monitor = ProgressMonitor::new(5, Duration::from_secs(1));
        let mut session = ScriptedSession {
            queries: 0,
            known_after: None,
            duration: Duration::ZERO,
        };

        let start = Instant::now();
        let outcome = monitor
            .wait_while_playing(&mut session, ProgressHandle(1))
            .await
            .unwrap();

        assert_eq!(outcome, ProgressOutcome::Unknown);
        assert_eq!(session.queries, 5);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_for_reported_duration() {
        let monitor = ProgressMonitor::new(5, Duration::from_secs(1));
        let mut session = ScriptedSession {
            queries: 0,
            known_after: Some(3),
            duration: Duration::from_secs(30),
        };

        let start = Instant::now();
        let outcome = monitor
            .wait_while_playing(&mut session, ProgressHandle(1))
            .await
            .unwrap();

        assert_eq!(outcome, ProgressOutcome::Played(Duration::from_secs(30)));
        assert_eq!(session.queries, 3);
        // two retries, then the item itself
        assert_eq!(start.elapsed(), Duration::from_secs(32));
    }

    #[test]
    fn test_zero_attempts_still_queries_once() {
        let monitor = ProgressMonitor::new(0, Duration::from_secs(1));
        assert_eq!(monitor.attempts, 1);
    }
}
