use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;
use uuid::Uuid;

use crate::api::AnalysisApi;
use crate::backoff::MIN_DELAY;
use crate::cancel::CancelSignal;
use crate::config::BackoffConfig;
use crate::error::{ApiError, PollError};
use crate::models::{AnalysisTask, ReverseSearchTask};

const ANALYSIS: &str = "analysis";
const REVERSE_SEARCH: &str = "reverse search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyAccept {
    // Matches a single engine must report; values below 1 are treated as 1.
    pub min_engine_matches: usize,
}

impl EarlyAccept {
    pub fn accepts(&self, snapshot: &ReverseSearchTask) -> bool {
        let threshold = self.min_engine_matches.max(1);
        snapshot
            .results
            .match_counts()
            .iter()
            .any(|count| *count >= threshold)
    }
}

impl Default for EarlyAccept {
    fn default() -> Self {
        Self {
            min_engine_matches: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub max_duration: Duration,
    // Consecutive 5xx responses tolerated; the next one is escalated.
    pub max_server_errors: u32,
    // Reverse-search tolerance while no snapshot has been received yet.
    pub reverse_cold_start_server_errors: u32,
    pub analysis_min_interval: Duration,
    pub reverse_min_interval: Duration,
    pub analysis_backoff: BackoffConfig,
    pub reverse_backoff: BackoffConfig,
    pub early_accept: EarlyAccept,
    pub server_error_penalty: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(75),
            max_server_errors: 2,
            reverse_cold_start_server_errors: 3,
            analysis_min_interval: Duration::from_millis(800),
            reverse_min_interval: Duration::from_secs(15),
            analysis_backoff: BackoffConfig {
                start: Duration::from_secs(10),
                factor: 2.0,
                max_delay: Duration::from_secs(120),
                jitter_min: 1.0,
                jitter_max: 1.0,
            },
            reverse_backoff: BackoffConfig {
                start: Duration::from_secs(2),
                factor: 1.6,
                max_delay: Duration::from_secs(10),
                jitter_min: 0.85,
                jitter_max: 1.15,
            },
            early_accept: EarlyAccept::default(),
            server_error_penalty: Duration::from_secs(2),
        }
    }
}

// Each call owns its clock, backoff and last snapshot, so one poller can
// serve any number of concurrent polls.
#[derive(Clone)]
pub struct TaskPoller {
    api: Arc<dyn AnalysisApi>,
    config: PollerConfig,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn AnalysisApi>, config: PollerConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    // A `failed` task is returned, not raised.
    pub async fn wait_for_analysis_result(
        &self,
        task_id: Uuid,
        interval: Duration,
        cancel: &CancelSignal,
    ) -> Result<AnalysisTask, PollError> {
        let config = &self.config;
        let hint = interval.max(config.analysis_min_interval);
        let mut backoff = BackoffConfig {
            start: config.analysis_backoff.start.max(hint),
            ..config.analysis_backoff
        }
        .build();
        let started = Instant::now();
        let mut server_errors = 0u32;
        let mut last_rank: Option<u8> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            if started.elapsed() > config.max_duration {
                tracing::warn!(%task_id, budget_secs = config.max_duration.as_secs(), "analysis poll timed out");
                return Err(PollError::Timeout {
                    operation: ANALYSIS,
                    budget: config.max_duration,
                });
            }

            match fetch(cancel, self.api.get_analysis_task(task_id)).await {
                Ok(task) => {
                    let rank = task.status.progress_rank();
                    if last_rank.is_some_and(|last| rank < last) {
                        tracing::warn!(%task_id, status = task.status.as_str(), "analysis status went backwards");
                    }
                    last_rank = Some(rank);

                    if task.status.is_terminal() {
                        tracing::info!(
                            %task_id,
                            status = task.status.as_str(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "analysis poll done"
                        );
                        return Ok(task);
                    }

                    let delay = backoff.current();
                    tracing::debug!(
                        %task_id,
                        status = task.status.as_str(),
                        delay_ms = delay.as_millis() as u64,
                        "analysis poll sleep"
                    );
                    sleep(cancel, delay).await?;
                    backoff.next_delay();
                    server_errors = 0;
                }
                Err(err) if err.is_server_error() => {
                    server_errors += 1;
                    if server_errors > config.max_server_errors {
                        tracing::warn!(%task_id, server_errors, error = %err, "analysis poll giving up after server errors");
                        return Err(err);
                    }
                    let delay = backoff.current() + config.server_error_penalty;
                    tracing::warn!(
                        %task_id,
                        server_errors,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "analysis poll server error, retrying"
                    );
                    sleep(cancel, delay).await?;
                    backoff.next_delay();
                }
                Err(err) => return Err(err),
            }
        }
    }

    // Out of time or 5xx tolerance still yields the last snapshot
    // when it carries any visual match.
    pub async fn wait_for_reverse_search_result(
        &self,
        task_id: Uuid,
        interval: Duration,
        cancel: &CancelSignal,
    ) -> Result<ReverseSearchTask, PollError> {
        let config = &self.config;
        let started = Instant::now();
        let warmup = interval.max(config.reverse_min_interval);

        tracing::debug!(%task_id, delay_ms = warmup.as_millis() as u64, "reverse search warm-up");
        sleep(cancel, warmup).await?;

        let mut backoff = config.reverse_backoff.build();
        let mut server_errors = 0u32;
        let mut last: Option<ReverseSearchTask> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            if started.elapsed() > config.max_duration {
                if let Some(snapshot) = last.filter(ReverseSearchTask::has_any_visuals) {
                    tracing::info!(%task_id, "reverse search timed out, returning partial snapshot");
                    return Ok(snapshot);
                }
                tracing::warn!(%task_id, budget_secs = config.max_duration.as_secs(), "reverse search poll timed out");
                return Err(PollError::Timeout {
                    operation: REVERSE_SEARCH,
                    budget: config.max_duration,
                });
            }

            match fetch(cancel, self.api.get_reverse_search(task_id)).await {
                Ok(snapshot) => {
                    if let Some(previous) = &last {
                        if completed_engines(&snapshot) < completed_engines(previous) {
                            tracing::warn!(%task_id, "reverse search engine status went backwards");
                        }
                    }
                    let [google, yandex, bing] = snapshot.results.match_counts();

                    if snapshot.all_engines_completed() {
                        tracing::info!(%task_id, google, yandex, bing, "reverse search completed");
                        return Ok(snapshot);
                    }
                    if config.early_accept.accepts(&snapshot) {
                        tracing::info!(%task_id, google, yandex, bing, "reverse search good enough, returning early");
                        return Ok(snapshot);
                    }
                    last = Some(snapshot);

                    let remaining = config.max_duration.saturating_sub(started.elapsed());
                    let delay = if remaining.is_zero() {
                        MIN_DELAY
                    } else {
                        backoff.current().min(remaining)
                    };
                    tracing::debug!(%task_id, delay_ms = delay.as_millis() as u64, "reverse search poll sleep");
                    sleep(cancel, delay).await?;
                    backoff.next_delay();
                    server_errors = 0;
                }
                Err(err) if err.is_server_error() => {
                    server_errors += 1;
                    let allowed = if last.is_none() {
                        config.reverse_cold_start_server_errors
                    } else {
                        config.max_server_errors
                    };
                    if server_errors > allowed {
                        if let Some(snapshot) = last.filter(ReverseSearchTask::has_any_visuals) {
                            tracing::info!(%task_id, server_errors, "reverse search returning partial snapshot after server errors");
                            return Ok(snapshot);
                        }
                        tracing::warn!(%task_id, server_errors, error = %err, "reverse search giving up after server errors");
                        return Err(err);
                    }
                    let delay = backoff.current() + config.server_error_penalty;
                    tracing::warn!(
                        %task_id,
                        server_errors,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "reverse search server error, retrying"
                    );
                    sleep(cancel, delay).await?;
                    backoff.next_delay();
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn completed_engines(snapshot: &ReverseSearchTask) -> usize {
    let status = &snapshot.status;
    [&status.google, &status.yandex, &status.bing]
        .iter()
        .filter(|value| value.eq_ignore_ascii_case("completed"))
        .count()
}

async fn fetch<T>(
    cancel: &CancelSignal,
    request: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, PollError> {
    match cancel.run(request).await {
        Some(result) => result.map_err(PollError::from),
        None => Err(PollError::Cancelled),
    }
}

async fn sleep(cancel: &CancelSignal, delay: Duration) -> Result<(), PollError> {
    if cancel.sleep_or_cancel(delay).await {
        return Err(PollError::Cancelled);
    }
    Ok(())
}
