//! Remote-debugging contract consumed by the evaluators.
//!
//! Implementations talk to a live page (see `locus-h` for the Chromium one).
//! Every method is an idempotent read except `click_at`. Implementations must
//! serialize command dispatch on their channel; callers may invoke methods
//! from concurrent futures.

use crate::geometry::{Point, Quad};
use crate::strategy::RoleStates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session-scoped DOM node id. Only valid until the document changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(i64);

impl NodeId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Opaque reference to a page element that outlives a single query.
/// Never assume it survives a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(i64);

impl ElementHandle {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// A paged result set from a path-expression / text search.
/// Must be handed back through `discard_search` once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub id: String,
    pub result_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Lower-cased tag name.
    pub tag: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl NodeDescription {
    pub fn id(&self) -> Option<&str> {
        self.attributes
            .get("id")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Accessibility-tree query. Both filters are optional.
///
/// Remote accessible-name matching is exact only, so adapters forward the
/// name for exact queries and otherwise filter with `accepts_name`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxQuery {
    pub role: Option<String>,
    pub name: Option<String>,
    pub exact: bool,
}

impl AxQuery {
    /// Trimmed equality when exact, case-insensitive substring otherwise.
    pub fn accepts_name(&self, actual: &str) -> bool {
        let Some(wanted) = self.name.as_deref().map(str::trim) else {
            return true;
        };
        let actual = actual.trim();
        if self.exact {
            actual == wanted
        } else {
            actual.to_lowercase().contains(&wanted.to_lowercase())
        }
    }
}

/// An accessibility node that matched an `AxQuery`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxMatch {
    /// Backing DOM element, if the AX node has one.
    pub handle: Option<ElementHandle>,
    pub role: String,
    pub name: String,
    pub states: RoleStates,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DevToolsError {
    #[error("Not ready")]
    NotReady,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Invalid selector: {selector}")]
    SelectorInvalid { selector: String },

    #[error("Node not found")]
    NodeNotFound,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not supported: {0}")]
    NotSupported(String),
}

#[async_trait]
pub trait DevToolsClient: Send + Sync {
    /// Root node of the top-level document.
    async fn document(&self) -> Result<NodeId, DevToolsError>;

    /// First match of a CSS selector under `root`.
    async fn query_selector(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, DevToolsError>;

    /// All matches of a CSS selector under `root`.
    async fn query_selector_all(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, DevToolsError>;

    /// Root nodes of embedded documents (iframes), outermost first.
    async fn frame_documents(&self) -> Result<Vec<NodeId>, DevToolsError> {
        Ok(vec![])
    }

    /// Start a search for a plain string, CSS selector or XPath expression.
    async fn perform_search(&self, query: &str) -> Result<SearchSession, DevToolsError>;

    /// Read `[from, to)` of a search's results.
    async fn search_results(
        &self,
        search: &SearchSession,
        from: usize,
        to: usize,
    ) -> Result<Vec<NodeId>, DevToolsError>;

    async fn discard_search(&self, search: SearchSession) -> Result<(), DevToolsError>;

    /// Translate a session node id into a stable element handle.
    async fn backend_handle(&self, node: NodeId) -> Result<ElementHandle, DevToolsError>;

    /// Content quad of the element's box model.
    async fn box_model(&self, handle: ElementHandle) -> Result<Quad, DevToolsError>;

    /// Hit-test a viewport point.
    async fn node_at_point(&self, point: Point) -> Result<Option<ElementHandle>, DevToolsError>;

    async fn describe(&self, handle: ElementHandle) -> Result<NodeDescription, DevToolsError>;

    async fn query_accessibility(&self, _query: &AxQuery) -> Result<Vec<AxMatch>, DevToolsError> {
        Err(DevToolsError::NotSupported("query_accessibility".into()))
    }

    /// PNG of the current viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, DevToolsError> {
        Err(DevToolsError::NotSupported("capture_screenshot".into()))
    }

    /// Dispatch a left click at a viewport point.
    async fn click_at(&self, _point: Point) -> Result<(), DevToolsError> {
        Err(DevToolsError::NotSupported("click_at".into()))
    }
}
