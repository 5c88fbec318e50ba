use super::{StrategyEvaluator, devtools_failure, wrong_kind};
use crate::scoring::{
    SelectorClass, SelectorSyntax, classify_selector, penalize_matches, selector_syntax,
    structural_base,
};
use async_trait::async_trait;
use locus_common::{
    DevToolsClient, LocateError, LocatorStrategy, NodeId, StrategyEvaluation, StrategyKind,
    StrategyTarget,
};

/// Resolves CSS selectors and XPath expressions against the live DOM.
///
/// CSS that matches nothing in the top document is retried inside each
/// embedded document. XPath goes through the search API, which already
/// spans frames.
pub struct StructuralEvaluator;

#[async_trait]
impl StrategyEvaluator for StructuralEvaluator {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        kind == StrategyKind::StructuralSelector
    }

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        if !matches!(strategy.target, StrategyTarget::StructuralSelector(_)) {
            return StrategyEvaluation::failed(strategy, wrong_kind(self.name(), strategy));
        }
        let Some(selector) = strategy
            .selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return StrategyEvaluation::failed(
                strategy,
                LocateError::Configuration("Structural strategy has no selector".into()),
            );
        };

        match locate(page, strategy, selector).await {
            Ok(evaluation) => evaluation,
            Err(e) => StrategyEvaluation::failed(strategy, e),
        }
    }
}

async fn locate(
    page: &dyn DevToolsClient,
    strategy: &LocatorStrategy,
    selector: &str,
) -> Result<StrategyEvaluation, LocateError> {
    let syntax = selector_syntax(selector);
    let mut in_frame = false;

    let mut nodes = match syntax {
        SelectorSyntax::Css => {
            let root = page.document().await.map_err(devtools_failure)?;
            page.query_selector_all(root, selector)
                .await
                .map_err(devtools_failure)?
        }
        SelectorSyntax::XPath => search(page, selector).await?,
    };

    if nodes.is_empty() && syntax == SelectorSyntax::Css {
        for frame in page.frame_documents().await.map_err(devtools_failure)? {
            nodes = page
                .query_selector_all(frame, selector)
                .await
                .map_err(devtools_failure)?;
            if !nodes.is_empty() {
                in_frame = true;
                break;
            }
        }
    }

    let Some(first) = nodes.first().copied() else {
        return Err(LocateError::NotFound(selector.to_string()));
    };

    let handle = page.backend_handle(first).await.map_err(devtools_failure)?;
    let quad = page.box_model(handle).await.map_err(devtools_failure)?;
    let confidence = penalize_matches(structural_base(selector), nodes.len());

    let class = match classify_selector(selector) {
        SelectorClass::AttributeBased => "attribute",
        SelectorClass::Positional => "positional",
    };

    let mut evaluation = StrategyEvaluation::found(strategy, confidence, quad.center())
        .with_handle(handle)
        .with_match_count(nodes.len())
        .with_diagnostic("selectorClass", class);
    if in_frame {
        evaluation = evaluation.with_diagnostic("frame", true);
    }
    Ok(evaluation)
}

/// Run a path-expression search and always hand the result set back.
pub(crate) async fn search(
    page: &dyn DevToolsClient,
    query: &str,
) -> Result<Vec<NodeId>, LocateError> {
    let session = page.perform_search(query).await.map_err(devtools_failure)?;
    let nodes = if session.result_count == 0 {
        Ok(vec![])
    } else {
        page.search_results(&session, 0, session.result_count)
            .await
            .map_err(devtools_failure)
    };
    if let Err(e) = page.discard_search(session).await {
        tracing::warn!("Failed to discard search results: {}", e);
    }
    nodes
}
