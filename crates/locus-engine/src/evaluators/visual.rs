use super::{StrategyEvaluator, devtools_failure, wrong_kind};
use crate::ocr_service::OcrService;
use crate::scoring::ocr_confidence;
use async_trait::async_trait;
use locus_common::{
    DevToolsClient, FindTextOptions, LocateError, LocatorStrategy, StrategyEvaluation,
    StrategyKind, StrategyTarget, VisualTextQuery,
};
use std::sync::Arc;

/// Finds rendered text on a viewport screenshot through the shared OCR service.
pub struct VisualTextEvaluator {
    ocr: Option<Arc<OcrService>>,
    use_cache: bool,
}

impl VisualTextEvaluator {
    /// `use_cache = false` disables caching even for strategies that ask for it.
    pub fn new(ocr: Option<Arc<OcrService>>, use_cache: bool) -> Self {
        Self { ocr, use_cache }
    }

    async fn locate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
        query: &VisualTextQuery,
    ) -> Result<StrategyEvaluation, LocateError> {
        let Some(ocr) = &self.ocr else {
            return Err(LocateError::Configuration("No OCR engine configured".into()));
        };
        let target = query.target_text.trim();
        if target.is_empty() {
            return Err(LocateError::Configuration(
                "Visual text strategy has no target text".into(),
            ));
        }

        let image = page.capture_screenshot().await.map_err(devtools_failure)?;
        let options = FindTextOptions {
            exact: query.exact,
            case_sensitive: query.case_sensitive,
            use_cache: query.use_cache && self.use_cache,
        };
        let result = ocr.find_text(&image, target, options).await?;

        let (true, Some(point)) = (result.found, result.click_point) else {
            return Err(LocateError::NotFound(format!("text {:?}", target)));
        };

        let mut evaluation =
            StrategyEvaluation::found(strategy, ocr_confidence(result.confidence), point)
                .with_match_count(result.all_matches.len())
                .with_diagnostic("ocrConfidence", result.confidence);
        if let Some(matched) = result.matched_text {
            evaluation = evaluation.with_diagnostic("matchedText", matched);
        }
        Ok(evaluation)
    }
}

#[async_trait]
impl StrategyEvaluator for VisualTextEvaluator {
    fn name(&self) -> &'static str {
        "visual_text"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        kind == StrategyKind::VisualText
    }

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        let result = match &strategy.target {
            StrategyTarget::VisualText(query) => self.locate(page, strategy, query).await,
            _ => Err(wrong_kind(self.name(), strategy)),
        };
        result.unwrap_or_else(|e| StrategyEvaluation::failed(strategy, e))
    }
}
