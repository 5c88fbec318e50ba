use super::structural::search;
use super::{StrategyEvaluator, css_string, devtools_failure, wrong_kind, xpath_literal};
use crate::scoring::penalize_matches;
use async_trait::async_trait;
use locus_common::{
    AttributeLookup, AttributeQuery, AxMatch, AxQuery, DevToolsClient, DevToolsError,
    ElementHandle, LocateError, LocatorStrategy, RoleQuery, StrategyEvaluation, StrategyKind,
    StrategyTarget,
};

/// Accessibility-tree role queries and attribute lookups.
pub struct SemanticEvaluator;

#[async_trait]
impl StrategyEvaluator for SemanticEvaluator {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        matches!(
            kind,
            StrategyKind::SemanticRole | StrategyKind::SemanticAttribute
        )
    }

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        let result = match &strategy.target {
            StrategyTarget::SemanticRole(query) => by_role(page, strategy, query).await,
            StrategyTarget::SemanticAttribute(query) => by_attribute(page, strategy, query).await,
            _ => Err(wrong_kind(self.name(), strategy)),
        };
        result.unwrap_or_else(|e| StrategyEvaluation::failed(strategy, e))
    }
}

async fn by_role(
    page: &dyn DevToolsClient,
    strategy: &LocatorStrategy,
    query: &RoleQuery,
) -> Result<StrategyEvaluation, LocateError> {
    let role = query.role.trim();
    if role.is_empty() {
        return Err(LocateError::Configuration("Role strategy has no role".into()));
    }

    let name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let ax = AxQuery {
        role: Some(role.to_string()),
        name: name.map(str::to_string),
        exact: query.exact,
    };
    let candidates = page
        .query_accessibility(&ax)
        .await
        .map_err(devtools_failure)?;

    // AX nodes without a DOM element cannot be clicked, so they neither
    // resolve the step nor make it ambiguous.
    let matches: Vec<&AxMatch> = candidates
        .iter()
        .filter(|m| m.handle.is_some())
        .filter(|m| m.role.eq_ignore_ascii_case(role))
        .filter(|m| ax.accepts_name(&m.name))
        .filter(|m| query.states.accepts(&m.states))
        .collect();

    let target = match name {
        Some(n) => format!("role {} named {:?}", role, n),
        None => format!("role {}", role),
    };
    let Some(handle) = matches.iter().find_map(|m| m.handle) else {
        return Err(LocateError::NotFound(target));
    };

    let quad = page.box_model(handle).await.map_err(devtools_failure)?;
    let confidence = penalize_matches(query.ceiling(), matches.len());
    Ok(StrategyEvaluation::found(strategy, confidence, quad.center())
        .with_handle(handle)
        .with_match_count(matches.len()))
}

async fn by_attribute(
    page: &dyn DevToolsClient,
    strategy: &LocatorStrategy,
    query: &AttributeQuery,
) -> Result<StrategyEvaluation, LocateError> {
    let lookups = query.lookups();
    if lookups.is_empty() {
        return Err(LocateError::Configuration(
            "Attribute strategy has no lookup values".into(),
        ));
    }

    let mut last_error = None;
    for (lookup, value) in lookups {
        let handles = match lookup_handles(page, lookup, value, query.exact).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::debug!("{} lookup {:?} failed: {}", lookup.as_str(), value, e);
                last_error = Some(e);
                continue;
            }
        };
        let Some(handle) = handles.first().copied() else {
            continue;
        };
        let quad = match page.box_model(handle).await {
            Ok(quad) => quad,
            Err(e) => {
                last_error = Some(devtools_failure(e));
                continue;
            }
        };
        let confidence = penalize_matches(lookup.ceiling(), handles.len());
        return Ok(StrategyEvaluation::found(strategy, confidence, quad.center())
            .with_handle(handle)
            .with_match_count(handles.len())
            .with_diagnostic("lookup", lookup.as_str()));
    }

    Err(last_error.unwrap_or_else(|| LocateError::NotFound(strategy.describe())))
}

async fn lookup_handles(
    page: &dyn DevToolsClient,
    lookup: AttributeLookup,
    value: &str,
    exact: bool,
) -> Result<Vec<ElementHandle>, LocateError> {
    match lookup {
        AttributeLookup::TestId => {
            let selector = ["data-testid", "data-test-id", "data-test"]
                .iter()
                .map(|attr| attribute_selector(attr, value, exact))
                .collect::<Vec<_>>()
                .join(", ");
            css_handles(page, &selector).await
        }
        AttributeLookup::Label => label_handles(page, value, exact).await,
        AttributeLookup::Placeholder => {
            css_handles(page, &attribute_selector("placeholder", value, exact)).await
        }
        AttributeLookup::AltText => {
            css_handles(page, &attribute_selector("alt", value, exact)).await
        }
        AttributeLookup::Title => {
            css_handles(page, &attribute_selector("title", value, exact)).await
        }
        AttributeLookup::Text => {
            let literal = xpath_literal(value);
            let expression = if exact {
                format!("//*[text()[normalize-space(.)={}]]", literal)
            } else {
                format!("//*[text()[contains(normalize-space(.), {})]]", literal)
            };
            let nodes = search(page, &expression).await?;
            let mut handles = Vec::with_capacity(nodes.len());
            for node in nodes {
                handles.push(page.backend_handle(node).await.map_err(devtools_failure)?);
            }
            Ok(handles)
        }
    }
}

/// Accessible-name lookup, falling back to `aria-label` when the page has no
/// accessibility tree support.
async fn label_handles(
    page: &dyn DevToolsClient,
    value: &str,
    exact: bool,
) -> Result<Vec<ElementHandle>, LocateError> {
    let query = AxQuery {
        role: None,
        name: Some(value.to_string()),
        exact,
    };
    match page.query_accessibility(&query).await {
        Ok(matches) => Ok(matches
            .iter()
            .filter(|m| query.accepts_name(&m.name))
            .filter_map(|m| m.handle)
            .collect()),
        Err(DevToolsError::NotSupported(_)) => {
            css_handles(page, &attribute_selector("aria-label", value, exact)).await
        }
        Err(e) => Err(devtools_failure(e)),
    }
}

/// `[attr="v"]`, or a case-insensitive substring match when not exact.
fn attribute_selector(attribute: &str, value: &str, exact: bool) -> String {
    if exact {
        format!("[{}={}]", attribute, css_string(value))
    } else {
        format!("[{}*={} i]", attribute, css_string(value))
    }
}

async fn css_handles(
    page: &dyn DevToolsClient,
    selector: &str,
) -> Result<Vec<ElementHandle>, LocateError> {
    let root = page.document().await.map_err(devtools_failure)?;
    let nodes = page
        .query_selector_all(root, selector)
        .await
        .map_err(devtools_failure)?;
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        handles.push(page.backend_handle(node).await.map_err(devtools_failure)?);
    }
    Ok(handles)
}
