use super::{StrategyEvaluator, devtools_failure, wrong_kind};
use crate::config::EvidenceConfig;
use crate::scoring::{
    EvidenceScore, class_overlap, direction_score, distance_score, evidence_confidence, id_score,
    tag_score,
};
use async_trait::async_trait;
use locus_common::{
    DevToolsClient, ElementHandle, EvidenceMetadata, LocateError, LocatorStrategy, Point,
    StrategyEvaluation, StrategyKind, StrategyTarget,
};
use serde_json::json;
use std::collections::HashSet;
use std::f64::consts::TAU;

/// Ranks elements around the interaction endpoint by how well they agree
/// with the captured tag, id, classes and cursor approach.
pub struct EvidenceEvaluator {
    config: EvidenceConfig,
}

struct Candidate {
    handle: ElementHandle,
    center: Point,
    score: EvidenceScore,
    total: f64,
}

impl EvidenceEvaluator {
    pub fn new(config: EvidenceConfig) -> Self {
        Self { config }
    }

    /// The endpoint itself, then `ring_samples` points on each ring.
    pub fn sample_points(&self, endpoint: Point) -> Vec<Point> {
        let samples = self.config.ring_samples.max(1);
        let mut points = Vec::with_capacity(1 + self.config.ring_radii.len() * samples);
        points.push(endpoint);
        for radius in &self.config.ring_radii {
            for i in 0..samples {
                let angle = TAU * i as f64 / samples as f64;
                points.push(endpoint.offset(radius * angle.cos(), radius * angle.sin()));
            }
        }
        points
    }

    async fn collect_candidates(
        &self,
        page: &dyn DevToolsClient,
        endpoint: Point,
    ) -> Result<Vec<ElementHandle>, LocateError> {
        let mut seen = HashSet::new();
        let mut handles = Vec::new();
        let mut last_error = None;

        for point in self.sample_points(endpoint) {
            if handles.len() >= self.config.max_candidates {
                break;
            }
            match page.node_at_point(point).await {
                Ok(Some(handle)) => {
                    if seen.insert(handle) {
                        handles.push(handle);
                    }
                }
                Ok(None) => {}
                Err(e) => last_error = Some(e),
            }
        }

        match (handles.is_empty(), last_error) {
            (true, Some(e)) => Err(devtools_failure(e)),
            _ => Ok(handles),
        }
    }

    async fn score(
        &self,
        page: &dyn DevToolsClient,
        metadata: &EvidenceMetadata,
        handle: ElementHandle,
    ) -> Result<Candidate, LocateError> {
        let description = page.describe(handle).await.map_err(devtools_failure)?;
        let center = page
            .box_model(handle)
            .await
            .map_err(devtools_failure)?
            .center();

        let score = EvidenceScore {
            tag: tag_score(metadata.expected_tag.as_deref(), &description.tag),
            id: id_score(metadata.expected_id.as_deref(), description.id()),
            classes: class_overlap(&metadata.expected_classes, &description.classes()),
            distance: distance_score(
                metadata.endpoint.distance_to(&center),
                self.config.max_distance,
            ),
            direction: direction_score(
                metadata.trail_direction.as_ref(),
                &metadata.endpoint,
                &center,
            ),
        };
        Ok(Candidate {
            handle,
            center,
            total: score.weighted(&self.config.weights),
            score,
        })
    }

    async fn locate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
        metadata: &EvidenceMetadata,
    ) -> Result<StrategyEvaluation, LocateError> {
        let endpoint = metadata.endpoint;
        if !endpoint.x.is_finite() || !endpoint.y.is_finite() {
            return Err(LocateError::Configuration(
                "Evidence strategy has no usable endpoint".into(),
            ));
        }

        let handles = self.collect_candidates(page, endpoint).await?;
        let mut candidates = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.score(page, metadata, handle).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => tracing::debug!("Skipping evidence candidate {:?}: {}", handle, e),
            }
        }

        let near = format!("element near ({:.0}, {:.0})", endpoint.x, endpoint.y);
        let Some(best) = candidates
            .iter()
            .max_by(|a, b| a.total.total_cmp(&b.total))
        else {
            return Err(LocateError::NotFound(near));
        };

        if best.total < self.config.min_score {
            return Err(LocateError::NotFound(format!(
                "{} scoring at least {:.2} (best {:.2})",
                near, self.config.min_score, best.total
            )));
        }

        Ok(
            StrategyEvaluation::found(strategy, evidence_confidence(best.total), best.center)
                .with_handle(best.handle)
                .with_match_count(candidates.len())
                .with_diagnostic("score", best.total)
                .with_diagnostic(
                    "breakdown",
                    json!({
                        "tag": best.score.tag,
                        "id": best.score.id,
                        "classes": best.score.classes,
                        "distance": best.score.distance,
                        "direction": best.score.direction,
                    }),
                ),
        )
    }
}

#[async_trait]
impl StrategyEvaluator for EvidenceEvaluator {
    fn name(&self) -> &'static str {
        "evidence"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        kind == StrategyKind::EvidenceScored
    }

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        let result = match &strategy.target {
            StrategyTarget::EvidenceScored(metadata) => self.locate(page, strategy, metadata).await,
            _ => Err(wrong_kind(self.name(), strategy)),
        };
        result.unwrap_or_else(|e| StrategyEvaluation::failed(strategy, e))
    }
}
