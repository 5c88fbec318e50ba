//! Conditional polling on top of the visual-text evaluator.
//!
//! Each poll re-captures and re-OCRs the page, clicking every target text it
//! can see. The loop ends when the success marker shows up, when no click has
//! happened for `idle_timeout`, or when stopped. Every click resets the idle
//! clock, so a page that keeps making progress can poll for much longer than
//! `idle_timeout` in total.
//!
//! Every screenshot/OCR round runs under the evaluator timeout, clipped to
//! what is left of the idle window, and is abandoned as soon as the poll is
//! stopped.

use crate::config::{ResolutionConfig, VisionConfig};
use crate::control::{RunControl, Stopped};
use crate::evaluators::{StrategyEvaluator, VisualTextEvaluator};
use locus_common::{
    DevToolsClient, LocateError, LocatorStrategy, Point, StrategyEvaluation, VisualTextQuery,
    ceiling,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// The success marker became visible.
    Success,
    /// No click for the whole idle window.
    IdleTimeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollClick {
    pub target: String,
    pub point: Point,
    /// Since the poll started.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub status: PollStatus,
    pub clicks: Vec<PollClick>,
    pub polls: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ConditionalPoll {
    targets: Vec<String>,
    success_text: Option<String>,
    interval: Duration,
    idle_timeout: Duration,
    post_click_delay: Duration,
    evaluator_timeout: Duration,
    exact: bool,
    case_sensitive: bool,
}

impl ConditionalPoll {
    pub fn new(targets: Vec<String>) -> Self {
        Self::from_config(targets, &VisionConfig::default())
    }

    pub fn from_config(targets: Vec<String>, config: &VisionConfig) -> Self {
        Self {
            targets,
            success_text: None,
            interval: Duration::from_millis(config.poll_interval_ms),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            post_click_delay: Duration::from_millis(config.post_click_delay_ms),
            evaluator_timeout: Duration::from_millis(
                ResolutionConfig::default().evaluator_timeout_ms,
            ),
            exact: false,
            case_sensitive: false,
        }
    }

    pub fn with_success_text(mut self, text: impl Into<String>) -> Self {
        self.success_text = Some(text.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_post_click_delay(mut self, delay: Duration) -> Self {
        self.post_click_delay = delay;
        self
    }

    /// Upper bound for one screenshot and OCR round.
    pub fn with_evaluator_timeout(mut self, timeout: Duration) -> Self {
        self.evaluator_timeout = timeout;
        self
    }

    pub fn with_matching(mut self, exact: bool, case_sensitive: bool) -> Self {
        self.exact = exact;
        self.case_sensitive = case_sensitive;
        self
    }

    fn strategy(&self, text: &str) -> LocatorStrategy {
        LocatorStrategy::visual_text(
            VisualTextQuery {
                target_text: text.to_string(),
                exact: self.exact,
                case_sensitive: self.case_sensitive,
                // The page changes between polls; a cached read would hide that.
                use_cache: false,
            },
            ceiling::VISUAL_TEXT,
        )
    }

    /// Look for `text` once. Never waits past `deadline`.
    async fn observe(
        &self,
        page: &dyn DevToolsClient,
        evaluator: &VisualTextEvaluator,
        control: &RunControl,
        text: &str,
        deadline: Instant,
    ) -> Result<StrategyEvaluation, Stopped> {
        let strategy = self.strategy(text);
        let budget = self
            .evaluator_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        tokio::select! {
            biased;
            _ = control.stopped() => Err(Stopped),
            result = tokio::time::timeout(budget, evaluator.evaluate(page, &strategy)) => {
                Ok(result.unwrap_or_else(|_| {
                    let ms = millis(budget);
                    tracing::warn!("OCR lookup for {:?} timed out after {} ms", text, ms);
                    StrategyEvaluation::failed(&strategy, LocateError::Timeout(ms))
                }))
            }
        }
    }

    pub async fn run(
        &self,
        page: &dyn DevToolsClient,
        evaluator: &VisualTextEvaluator,
        control: &RunControl,
    ) -> PollOutcome {
        let started = Instant::now();
        let mut last_progress = started;
        let mut clicks = Vec::new();
        let mut polls = 0u32;

        let finish = |status: PollStatus, clicks: Vec<PollClick>, polls: u32| {
            let outcome = PollOutcome {
                status,
                clicks,
                polls,
                elapsed_ms: millis(started.elapsed()),
            };
            tracing::info!(
                "Conditional poll finished: {:?} after {} polls, {} clicks",
                outcome.status,
                outcome.polls,
                outcome.clicks.len()
            );
            outcome
        };

        loop {
            if control.is_stopped() {
                return finish(PollStatus::Cancelled, clicks, polls);
            }
            polls += 1;

            if let Some(marker) = &self.success_text {
                let deadline = last_progress + self.idle_timeout;
                match self.observe(page, evaluator, control, marker, deadline).await {
                    Ok(seen) if seen.found => return finish(PollStatus::Success, clicks, polls),
                    Ok(_) => {}
                    Err(Stopped) => return finish(PollStatus::Cancelled, clicks, polls),
                }
            }

            for target in &self.targets {
                let deadline = last_progress + self.idle_timeout;
                let Ok(evaluation) = self.observe(page, evaluator, control, target, deadline).await
                else {
                    return finish(PollStatus::Cancelled, clicks, polls);
                };
                let (true, Some(point)) = (evaluation.found, evaluation.click_point) else {
                    continue;
                };
                if let Err(e) = page.click_at(point).await {
                    tracing::warn!("Click on {:?} failed: {}", target, e);
                    continue;
                }
                tracing::debug!("Clicked {:?} at ({:.0}, {:.0})", target, point.x, point.y);
                last_progress = Instant::now();
                clicks.push(PollClick {
                    target: target.clone(),
                    point,
                    elapsed_ms: millis(started.elapsed()),
                });
                if control.sleep(self.post_click_delay).await.is_err() {
                    return finish(PollStatus::Cancelled, clicks, polls);
                }
            }

            let remaining = self.idle_timeout.saturating_sub(last_progress.elapsed());
            if remaining.is_zero() {
                return finish(PollStatus::IdleTimeout, clicks, polls);
            }
            if control.sleep(self.interval.min(remaining)).await.is_err() {
                return finish(PollStatus::Cancelled, clicks, polls);
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
