//! Blocking HTTP helpers shared by the remote providers
//!
//! Requests are retried with exponential backoff on transient failures.
//! Long-running remote tasks are awaited with [`PollSchedule`], a bounded
//! poll loop that runs on the background task, never on a request thread.

use nova_core::{NovaError, Result};
use std::time::Duration;
use tracing::debug;

const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// A JSON-over-HTTP client bound to one provider's credentials
pub struct HttpClient {
    label: &'static str,
    authorization: Option<String>,
    timeout: Duration,
    retries: usize,
}

impl HttpClient {
    pub fn new(label: &'static str, authorization: Option<String>, timeout: Duration) -> Self {
        Self {
            label,
            authorization,
            timeout,
            retries: MAX_RETRIES,
        }
    }

    /// Single attempt per call (for callers with a hard time budget)
    pub fn without_retries(mut self) -> Self {
        self.retries = 1;
        self
    }

    pub fn post_json(&self, url: &str, payload: &serde_json::Value) -> Result<serde_json::Value> {
        for attempt in 0..self.retries {
            let agent = build_agent(self.timeout);
            let mut request = agent.post(url).header("Content-Type", "application/json");
            if let Some(auth) = &self.authorization {
                request = request.header("Authorization", auth);
            }

            match request.send_json(payload) {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        NovaError::Upstream(format!(
                            "Failed to parse {} response: {}",
                            self.label, e
                        ))
                    });
                }
                Err(e) => {
                    if attempt + 1 < self.retries && is_retryable_error(&e) {
                        debug!(provider = self.label, attempt, error = %e, "retrying POST");
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(NovaError::Upstream(format!(
                        "{} request failed: {}",
                        self.label, e
                    )));
                }
            }
        }

        Err(NovaError::Upstream(format!(
            "{} request failed after retries",
            self.label
        )))
    }

    pub fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        for attempt in 0..self.retries {
            let agent = build_agent(self.timeout);
            let mut request = agent.get(url);
            if let Some(auth) = &self.authorization {
                request = request.header("Authorization", auth);
            }

            match request.call() {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        NovaError::Upstream(format!(
                            "Failed to parse {} poll response: {}",
                            self.label, e
                        ))
                    });
                }
                Err(e) => {
                    if attempt + 1 < self.retries && is_retryable_error(&e) {
                        debug!(provider = self.label, attempt, error = %e, "retrying GET");
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(NovaError::Upstream(format!(
                        "{} poll failed: {}",
                        self.label, e
                    )));
                }
            }
        }

        Err(NovaError::Upstream(format!(
            "{} poll failed after retries",
            self.label
        )))
    }

    /// Download a file without credentials (result URLs are pre-signed)
    pub fn download_bytes(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 0..self.retries {
            let agent = build_agent(self.timeout);

            match agent.get(url).call() {
                Ok(ok) => {
                    let mut reader = ok.into_body().into_reader();
                    let mut bytes = Vec::new();
                    std::io::Read::read_to_end(&mut reader, &mut bytes).map_err(|e| {
                        NovaError::Upstream(format!("Failed to read {} download: {}", self.label, e))
                    })?;
                    return Ok(bytes);
                }
                Err(e) => {
                    if attempt + 1 < self.retries && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(NovaError::Upstream(format!(
                        "Failed to download {} result: {}",
                        self.label, e
                    )));
                }
            }
        }

        Err(NovaError::Upstream(format!(
            "{} download failed after retries",
            self.label
        )))
    }
}

/// Outcome of one poll of a remote task
#[derive(Debug)]
pub enum PollStep<T> {
    /// Still running, with progress percentage when the service reports one
    Pending(Option<u8>),
    Done(T),
}

/// Bounded exponential-backoff schedule for polling remote tasks
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl PollSchedule {
    pub const fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before the given (zero-based) attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `step` until it reports `Done`, sleeping between attempts.
    /// Gives up with an upstream timeout after `max_attempts`.
    pub fn run<T>(
        &self,
        label: &str,
        mut step: impl FnMut(u32) -> Result<PollStep<T>>,
    ) -> Result<T> {
        for attempt in 0..self.max_attempts {
            std::thread::sleep(self.delay(attempt));
            match step(attempt)? {
                PollStep::Done(value) => return Ok(value),
                PollStep::Pending(progress) => {
                    debug!(task = label, attempt, ?progress, "remote task pending");
                }
            }
        }

        Err(NovaError::Upstream(format!(
            "{} timed out after {} poll attempts",
            label, self.max_attempts
        )))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let schedule = PollSchedule::new(Duration::from_millis(100), Duration::from_secs(1), 10);
        assert_eq!(schedule.delay(0), Duration::from_millis(100));
        assert_eq!(schedule.delay(1), Duration::from_millis(200));
        assert_eq!(schedule.delay(3), Duration::from_millis(800));
        assert_eq!(schedule.delay(4), Duration::from_secs(1));
        assert_eq!(schedule.delay(40), Duration::from_secs(1));
    }

    #[test]
    fn test_run_returns_when_done() {
        let schedule = PollSchedule::new(Duration::ZERO, Duration::ZERO, 5);
        let result = schedule
            .run("test", |attempt| {
                if attempt < 2 {
                    Ok(PollStep::Pending(Some(attempt as u8 * 40)))
                } else {
                    Ok(PollStep::Done("model.glb"))
                }
            })
            .unwrap();
        assert_eq!(result, "model.glb");
    }

    #[test]
    fn test_run_gives_up_after_max_attempts() {
        let schedule = PollSchedule::new(Duration::ZERO, Duration::ZERO, 3);
        let mut calls = 0;
        let err = schedule
            .run::<()>("mesh", |_| {
                calls += 1;
                Ok(PollStep::Pending(None))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, NovaError::Upstream(_)));
    }

    #[test]
    fn test_run_propagates_step_error() {
        let schedule = PollSchedule::new(Duration::ZERO, Duration::ZERO, 3);
        let err = schedule
            .run::<()>("mesh", |_| Err(NovaError::Upstream("FAILED".to_string())))
            .unwrap_err();
        assert!(err.to_string().contains("FAILED"));
    }
}
