//! `DevToolsClient` over a chromiumoxide page.
//!
//! Every command goes through one gate, so concurrent evaluators never
//! interleave on the websocket, and each command has its own timeout.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::accessibility::{AxNode, AxValue, QueryAxTreeParams};
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, DescribeNodeParams, DiscardSearchResultsParams, EventDocumentUpdated,
    GetBoxModelParams, GetDocumentParams, GetNodeForLocationParams, GetSearchResultsParams, Node,
    NodeId as CdpNodeId, PerformSearchParams, QuerySelectorAllParams, QuerySelectorParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::types::Command;
use futures::StreamExt;
use locus_common::{
    AxMatch, AxQuery, DevToolsClient, DevToolsError, ElementHandle, NodeDescription, NodeId,
    Point, Quad, RoleStates, SearchSession,
};
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Default per-command timeout. A blocking dialog stalls the DOM domain.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Root of the top-level document plus every embedded document, from one
/// full-depth fetch. Node ids stay valid until the document is replaced.
#[derive(Debug, Clone)]
struct DocumentRoots {
    root: NodeId,
    frames: Vec<NodeId>,
}

pub struct ChromiumPage {
    page: Page,
    gate: Mutex<()>,
    documents: Mutex<Option<DocumentRoots>>,
    stale: Arc<AtomicBool>,
    command_timeout: Duration,
}

impl ChromiumPage {
    /// Wrap a page and start tracking document replacement.
    pub async fn attach(page: Page) -> Result<Self, DevToolsError> {
        let stale = Arc::new(AtomicBool::new(true));
        let mut updates = page
            .event_listener::<EventDocumentUpdated>()
            .await
            .map_err(|e| devtools_error("DOM.documentUpdated", e))?;
        let flag = stale.clone();
        tokio::spawn(async move {
            while updates.next().await.is_some() {
                tracing::debug!("Document replaced; node ids invalidated");
                flag.store(true, Ordering::SeqCst);
            }
        });

        Ok(Self {
            page,
            gate: Mutex::new(()),
            documents: Mutex::new(None),
            stale,
            command_timeout: COMMAND_TIMEOUT,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Forget cached node ids, e.g. after navigating.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    async fn execute<T>(&self, operation: &str, params: T) -> Result<T::Response, DevToolsError>
    where
        T: Command + Clone,
    {
        retry_on_context_error(operation, || {
            let params = params.clone();
            async move {
                let _turn = self.gate.lock().await;
                match tokio::time::timeout(self.command_timeout, self.page.execute(params)).await {
                    Err(_) => Err(DevToolsError::Timeout {
                        operation: operation.to_string(),
                    }),
                    Ok(Err(e)) => Err(devtools_error(operation, e)),
                    Ok(Ok(response)) => Ok(response.result),
                }
            }
        })
        .await
    }

    async fn roots(&self) -> Result<DocumentRoots, DevToolsError> {
        let mut documents = self.documents.lock().await;
        if self.stale.swap(false, Ordering::SeqCst) {
            *documents = None;
        }
        if let Some(roots) = documents.as_ref() {
            return Ok(roots.clone());
        }

        // Each fetch re-numbers every node, so fetch the whole tree once.
        let params = GetDocumentParams::builder().depth(-1).pierce(true).build();
        let document = self.execute("DOM.getDocument", params).await?.root;
        let roots = DocumentRoots {
            root: node_id(&document.node_id),
            frames: frame_roots(&document),
        };
        tracing::debug!(
            "Fetched document {} with {} frame documents",
            roots.root.value(),
            roots.frames.len()
        );
        *documents = Some(roots.clone());
        Ok(roots)
    }

    async fn describe_node(&self, params: DescribeNodeParams) -> Result<Node, DevToolsError> {
        Ok(self.execute("DOM.describeNode", params).await?.node)
    }
}

#[async_trait]
impl DevToolsClient for ChromiumPage {
    async fn document(&self) -> Result<NodeId, DevToolsError> {
        Ok(self.roots().await?.root)
    }

    async fn query_selector(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, DevToolsError> {
        let params = QuerySelectorParams::new(CdpNodeId::new(root.value()), selector);
        let found = self
            .execute("DOM.querySelector", params)
            .await
            .map_err(|e| selector_error(e, selector))?;
        // 0 is the protocol's "no match".
        Ok(Some(node_id(&found.node_id)).filter(|id| id.value() != 0))
    }

    async fn query_selector_all(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, DevToolsError> {
        let params = QuerySelectorAllParams::new(CdpNodeId::new(root.value()), selector);
        let found = self
            .execute("DOM.querySelectorAll", params)
            .await
            .map_err(|e| selector_error(e, selector))?;
        Ok(found.node_ids.iter().map(node_id).collect())
    }

    async fn frame_documents(&self) -> Result<Vec<NodeId>, DevToolsError> {
        Ok(self.roots().await?.frames)
    }

    async fn perform_search(&self, query: &str) -> Result<SearchSession, DevToolsError> {
        // Search results reference the current numbering.
        self.roots().await?;
        let search = self
            .execute("DOM.performSearch", PerformSearchParams::new(query))
            .await?;
        Ok(SearchSession {
            id: search.search_id,
            result_count: usize::try_from(search.result_count).unwrap_or(0),
        })
    }

    async fn search_results(
        &self,
        search: &SearchSession,
        from: usize,
        to: usize,
    ) -> Result<Vec<NodeId>, DevToolsError> {
        let to = to.min(search.result_count);
        if from >= to {
            return Ok(vec![]);
        }
        let params = GetSearchResultsParams::new(search.id.clone(), from as i64, to as i64);
        let results = self.execute("DOM.getSearchResults", params).await?;
        Ok(results.node_ids.iter().map(node_id).collect())
    }

    async fn discard_search(&self, search: SearchSession) -> Result<(), DevToolsError> {
        self.execute(
            "DOM.discardSearchResults",
            DiscardSearchResultsParams::new(search.id),
        )
        .await?;
        Ok(())
    }

    async fn backend_handle(&self, node: NodeId) -> Result<ElementHandle, DevToolsError> {
        let params = DescribeNodeParams::builder()
            .node_id(CdpNodeId::new(node.value()))
            .build();
        let described = self.describe_node(params).await?;
        Ok(ElementHandle::new(*described.backend_node_id.inner()))
    }

    async fn box_model(&self, handle: ElementHandle) -> Result<Quad, DevToolsError> {
        let params = GetBoxModelParams::builder()
            .backend_node_id(BackendNodeId::new(handle.value()))
            .build();
        let model = self.execute("DOM.getBoxModel", params).await?.model;
        Quad::from_flat(model.content.inner()).ok_or_else(|| {
            DevToolsError::Protocol(format!(
                "Content quad has {} values",
                model.content.inner().len()
            ))
        })
    }

    async fn node_at_point(&self, point: Point) -> Result<Option<ElementHandle>, DevToolsError> {
        let params = GetNodeForLocationParams::new(point.x.round() as i64, point.y.round() as i64);
        match self.execute("DOM.getNodeForLocation", params).await {
            Ok(found) => Ok(Some(ElementHandle::new(*found.backend_node_id.inner()))),
            Err(DevToolsError::Protocol(message)) if message.contains("No node found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn describe(&self, handle: ElementHandle) -> Result<NodeDescription, DevToolsError> {
        let params = DescribeNodeParams::builder()
            .backend_node_id(BackendNodeId::new(handle.value()))
            .build();
        let node = self.describe_node(params).await?;
        Ok(NodeDescription {
            tag: node.local_name.to_lowercase(),
            attributes: attribute_map(node.attributes.as_deref().unwrap_or_default()),
        })
    }

    async fn query_accessibility(&self, query: &AxQuery) -> Result<Vec<AxMatch>, DevToolsError> {
        let root = self.document().await?;
        let nodes = self
            .execute("Accessibility.queryAXTree", ax_params(root, query))
            .await?
            .nodes;
        Ok(nodes
            .iter()
            .filter(|n| !n.ignored)
            .map(ax_match)
            .filter(|m| query.accepts_name(&m.name))
            .collect())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, DevToolsError> {
        let _turn = self.gate.lock().await;
        let capture = self.page.screenshot(ScreenshotParams::builder().build());
        match tokio::time::timeout(self.command_timeout, capture).await {
            Err(_) => Err(DevToolsError::Timeout {
                operation: "Page.captureScreenshot".into(),
            }),
            Ok(result) => result.map_err(|e| devtools_error("Page.captureScreenshot", e)),
        }
    }

    async fn click_at(&self, point: Point) -> Result<(), DevToolsError> {
        let _turn = self.gate.lock().await;
        let target = chromiumoxide::layout::Point::new(point.x, point.y);
        match tokio::time::timeout(self.command_timeout, self.page.click(target)).await {
            Err(_) => Err(DevToolsError::Timeout {
                operation: "Input.dispatchMouseEvent".into(),
            }),
            Ok(result) => result
                .map(|_| ())
                .map_err(|e| devtools_error("Input.dispatchMouseEvent", e)),
        }
    }
}

fn node_id(id: &CdpNodeId) -> NodeId {
    NodeId::new(*id.inner())
}

/// Content documents of every frame in the tree, outermost first.
fn frame_roots(document: &Node) -> Vec<NodeId> {
    let mut frames = Vec::new();
    let mut queue: VecDeque<&Node> = VecDeque::from([document]);
    while let Some(node) = queue.pop_front() {
        if let Some(content) = node.content_document.as_deref() {
            frames.push(node_id(&content.node_id));
            queue.push_back(content);
        }
        queue.extend(node.children.iter().flatten());
        queue.extend(node.shadow_roots.iter().flatten());
    }
    frames
}

/// CDP reports attributes as a flat `[name, value, name, value, ...]` list.
fn attribute_map(flat: &[String]) -> HashMap<String, String> {
    flat.chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// `accessibleName` only matches exactly on the browser side.
fn ax_params(root: NodeId, query: &AxQuery) -> QueryAxTreeParams {
    let mut params = QueryAxTreeParams::builder().node_id(CdpNodeId::new(root.value()));
    if let Some(role) = &query.role {
        params = params.role(role.clone());
    }
    if query.exact
        && let Some(name) = &query.name
    {
        params = params.accessible_name(name.trim().to_string());
    }
    params.build()
}

fn ax_match(node: &AxNode) -> AxMatch {
    let mut states = RoleStates::default();
    for property in node.properties.iter().flatten() {
        let Ok(serde_json::Value::String(name)) = serde_json::to_value(&property.name) else {
            continue;
        };
        match name.as_str() {
            "checked" => states.checked = ax_flag(&property.value),
            "disabled" => states.disabled = ax_flag(&property.value),
            "expanded" => states.expanded = ax_flag(&property.value),
            "pressed" => states.pressed = ax_flag(&property.value),
            "selected" => states.selected = ax_flag(&property.value),
            "level" => {
                states.level = ax_value(&property.value)
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u32::try_from(v).ok())
            }
            _ => {}
        }
    }

    AxMatch {
        handle: node
            .backend_dom_node_id
            .as_ref()
            .map(|id| ElementHandle::new(*id.inner())),
        role: ax_string(node.role.as_ref()),
        name: ax_string(node.name.as_ref()),
        states,
    }
}

fn ax_value(value: &AxValue) -> Option<&serde_json::Value> {
    value.value.as_ref()
}

fn ax_string(value: Option<&AxValue>) -> String {
    value
        .and_then(ax_value)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Tristate values ("mixed") count as not set.
fn ax_flag(value: &AxValue) -> Option<bool> {
    match ax_value(value)? {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) if s == "true" => Some(true),
        serde_json::Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

fn devtools_error(operation: &str, error: impl Display) -> DevToolsError {
    let message = error.to_string();
    if message.contains("Could not find node") || message.contains("No node with given id") {
        DevToolsError::NodeNotFound
    } else if message.contains("receiver is gone")
        || message.contains("channel closed")
        || message.contains("connection closed")
    {
        DevToolsError::ConnectionLost
    } else {
        DevToolsError::Protocol(format!("{} failed: {}", operation, message))
    }
}

fn selector_error(error: DevToolsError, selector: &str) -> DevToolsError {
    match error {
        DevToolsError::Protocol(message) if message.contains("DOM Error while querying") => {
            DevToolsError::SelectorInvalid {
                selector: selector.to_string(),
            }
        }
        other => other,
    }
}

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(error: &DevToolsError) -> bool {
    match error {
        DevToolsError::Protocol(message) => {
            message.contains("Cannot find context")
                || message.contains("Execution context was destroyed")
        }
        _ => false,
    }
}

/// Retry a command that may fail while the page is navigating.
/// Other errors return immediately.
async fn retry_on_context_error<T, F, Fut>(
    operation: &str,
    mut attempt: F,
) -> Result<T, DevToolsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DevToolsError>>,
{
    let mut last_error = None;
    for n in 0..MAX_CONTEXT_RETRIES {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if is_context_error(&e) => {
                tracing::debug!(
                    "{} context error (attempt {}/{}), retrying...",
                    operation,
                    n + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(e);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        DevToolsError::Protocol(format!("{} failed after retries", operation))
    }))
}
