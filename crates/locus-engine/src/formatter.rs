use locus_common::{
    FallbackChain, StepState, StepVerification, StrategyEvaluation, VerificationSession,
    VerificationSummary,
};

pub fn format_chain(chain: &FallbackChain) -> String {
    if chain.is_empty() {
        return "Empty chain.".to_string();
    }
    let mut output = format!("Fallback chain ({} strategies):", chain.len());
    for (i, strategy) in chain.iter().enumerate() {
        output.push_str(&format!(
            "\n  {}. [{:.2}] {}: {}",
            i + 1,
            strategy.confidence,
            strategy.kind(),
            strategy.describe()
        ));
    }
    output
}

pub fn format_evaluation(evaluation: &StrategyEvaluation) -> String {
    let status = match (evaluation.found, evaluation.below_threshold) {
        (true, false) => "found",
        (true, true) => "found (below threshold)",
        (false, _) => "not found",
    };
    let mut output = format!(
        "{} via {}: confidence {:.2} in {} ms",
        status,
        evaluation.strategy.describe(),
        evaluation.confidence,
        evaluation.duration_ms
    );
    if let Some(point) = evaluation.click_point {
        output.push_str(&format!(" at ({:.0}, {:.0})", point.x, point.y));
    }
    if let Some(count) = evaluation.match_count
        && count > 1
    {
        output.push_str(&format!(", {} matches", count));
    }
    if let Some(error) = &evaluation.error {
        output.push_str(&format!("\n    error: {}", error));
    }
    output
}

pub fn format_summary(summary: &VerificationSummary) -> String {
    format!(
        "{} steps: {} verified, {} repaired, {} flagged, {} skipped ({:.0}% verified){}",
        summary.total_steps,
        summary.verified_count,
        summary.repaired_count,
        summary.flagged_count,
        summary.skipped_count,
        summary.verification_rate * 100.0,
        if summary.can_save {
            ""
        } else {
            " - not ready to save"
        }
    )
}

fn format_step(step: &StepVerification) -> String {
    let label = match step.state {
        StepState::Pending => "PENDING",
        StepState::Verifying => "VERIFYING",
        StepState::Verified => "OK",
        StepState::Flagged => "FLAGGED",
        StepState::Repaired => "REPAIRED",
        StepState::Skipped => "SKIPPED",
    };
    let mut output = format!("[{}] #{} {}", label, step.step_index, step.step_id);
    if let Some(strategy) = &step.working_strategy {
        output.push_str(&format!(
            " via {} ({:.2})",
            strategy.describe(),
            step.confidence
        ));
    }
    if let Some(reason) = &step.flag_reason
        && step.state == StepState::Flagged
    {
        output.push_str(&format!("\n    {}", reason));
    }
    output
}

pub fn format_session(session: &VerificationSession) -> String {
    let mut output = format!("Verification {}", session.id);
    if session.cancelled {
        output.push_str(" (cancelled)");
    }
    for step in &session.steps {
        output.push('\n');
        output.push_str(&format_step(step));
    }
    output.push('\n');
    output.push_str(&format_summary(&session.summary));
    output
}

/// Full session as pretty JSON, for writing next to the recording.
pub fn session_report(session: &VerificationSession) -> serde_json::Result<String> {
    serde_json::to_string_pretty(session)
}
