use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::utils::RetryStrategy;
use super::traits::GameRegistry;
use super::types::{GameId, StatusResponse};
use super::worker::ActivityReport;

/// 轮询结果
#[derive(Debug)]
pub(crate) enum PollOutcome {
    /// 后端返回的状态（包括终态）
    Status(StatusResponse),
    /// 连续失败或超时，放弃轮询
    GaveUp(String),
}

/// 处理状态轮询
pub(crate) struct StatusPoller {
    pub(crate) registry: Arc<dyn GameRegistry>,
    pub(crate) game_id: GameId,
    pub(crate) interval: Duration,
    pub(crate) backoff: RetryStrategy,
    pub(crate) max_failures: u32,
    pub(crate) processing_timeout: Duration,
    pub(crate) cancellation_token: CancellationToken,
    pub(crate) reports: mpsc::UnboundedSender<ActivityReport>,
    pub(crate) generation: u64,
}

impl StatusPoller {
    pub(crate) async fn run(self) {
        let deadline = Instant::now() + self.processing_timeout;
        let mut failures = 0u32;
        let mut delay = self.interval;

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if Instant::now() >= deadline {
                self.report(PollOutcome::GaveUp(format!(
                    "Processing did not finish within {}s",
                    self.processing_timeout.as_secs()
                )));
                break;
            }

            let result = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                result = self.registry.game_status(self.game_id) => result,
            };

            match result {
                Ok(status) => {
                    failures = 0;
                    delay = self.interval;

                    let terminal = status.status().is_terminal();
                    debug!(game_id = %self.game_id, status = %status.game_status, "polled status");
                    self.report(PollOutcome::Status(status));
                    if terminal {
                        break;
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(game_id = %self.game_id, failures, "status poll failed: {}", err);

                    if failures >= self.max_failures {
                        self.report(PollOutcome::GaveUp(format!(
                            "Status check failed {failures} times in a row: {err}"
                        )));
                        break;
                    }
                    delay = self.backoff.get_delay(failures - 1);
                }
            }
        }

        debug!(game_id = %self.game_id, "status poller stopped");
    }

    fn report(&self, outcome: PollOutcome) {
        let _ = self.reports.send(ActivityReport::Poll {
            generation: self.generation,
            outcome,
        });
    }
}
