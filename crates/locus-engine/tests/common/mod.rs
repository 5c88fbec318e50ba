#![allow(dead_code)]

use async_trait::async_trait;
use locus_common::{
    AxMatch, AxQuery, DevToolsClient, DevToolsError, ElementHandle, LocateError,
    LocatorStrategy, NodeDescription, NodeId, OcrEngine, OcrError, OcrFragment, Point, Quad,
    Rect, RoleStates, SearchSession, StrategyEvaluation, StrategyKind,
};
use locus_engine::StrategyEvaluator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const DOCUMENT: NodeId = NodeId::new(1);

/// One element on the fake page. Node id and handle share the same number.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub id: i64,
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub rect: Rect,
    /// CSS selectors this element matches.
    pub css: Vec<String>,
    /// Search queries (XPath expressions) this element matches.
    pub searches: Vec<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub states: RoleStates,
    /// Root node of the embedded document holding this element.
    pub frame: Option<i64>,
    /// Present in the accessibility tree only, with no DOM element behind it.
    pub detached: bool,
}

impl FakeElement {
    pub fn new(id: i64, tag: &str, rect: Rect) -> Self {
        Self {
            id,
            tag: tag.to_string(),
            rect,
            ..Default::default()
        }
    }

    pub fn css(mut self, selector: &str) -> Self {
        self.css.push(selector.to_string());
        self
    }

    pub fn search(mut self, query: &str) -> Self {
        self.searches.push(query.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn role(mut self, role: &str, name: &str) -> Self {
        self.role = Some(role.to_string());
        self.name = Some(name.to_string());
        self
    }

    pub fn states(mut self, states: RoleStates) -> Self {
        self.states = states;
        self
    }

    pub fn in_frame(mut self, frame: i64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn handle(&self) -> ElementHandle {
        ElementHandle::new(self.id)
    }
}

/// Scripted in-memory page.
#[derive(Default)]
pub struct FakePage {
    elements: Vec<FakeElement>,
    frames: Vec<i64>,
    accessibility: bool,
    screenshot: Vec<u8>,
    broken: AtomicBool,
    delay: Option<Duration>,
    pub commands: AtomicUsize,
    pub open_searches: AtomicUsize,
    pub clicks: Mutex<Vec<Point>>,
}

impl FakePage {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        let mut frames: Vec<i64> = elements.iter().filter_map(|e| e.frame).collect();
        frames.sort_unstable();
        frames.dedup();
        Self {
            elements,
            frames,
            accessibility: true,
            screenshot: vec![0x89, b'P', b'N', b'G'],
            ..Default::default()
        }
    }

    pub fn without_accessibility(mut self) -> Self {
        self.accessibility = false;
        self
    }

    /// Every command sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every command fails with a lost connection from now on.
    pub fn break_connection(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.clicks.lock().unwrap().clone()
    }

    async fn command(&self) -> Result<(), DevToolsError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(DevToolsError::ConnectionLost);
        }
        Ok(())
    }

    fn element(&self, id: i64) -> Result<&FakeElement, DevToolsError> {
        self.elements
            .iter()
            .find(|e| e.id == id)
            .ok_or(DevToolsError::NodeNotFound)
    }
}

#[async_trait]
impl DevToolsClient for FakePage {
    async fn document(&self) -> Result<NodeId, DevToolsError> {
        self.command().await?;
        Ok(DOCUMENT)
    }

    async fn query_selector(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, DevToolsError> {
        Ok(self.query_selector_all(root, selector).await?.first().copied())
    }

    async fn query_selector_all(
        &self,
        root: NodeId,
        selector: &str,
    ) -> Result<Vec<NodeId>, DevToolsError> {
        self.command().await?;
        if selector.starts_with("!!") {
            return Err(DevToolsError::SelectorInvalid {
                selector: selector.to_string(),
            });
        }
        let frame = (root != DOCUMENT).then_some(root.value());
        let alternatives: Vec<&str> = selector.split(", ").collect();
        Ok(self
            .elements
            .iter()
            .filter(|e| e.frame == frame)
            .filter(|e| e.css.iter().any(|c| alternatives.contains(&c.as_str())))
            .map(|e| NodeId::new(e.id))
            .collect())
    }

    async fn frame_documents(&self) -> Result<Vec<NodeId>, DevToolsError> {
        self.command().await?;
        Ok(self.frames.iter().map(|f| NodeId::new(*f)).collect())
    }

    async fn perform_search(&self, query: &str) -> Result<SearchSession, DevToolsError> {
        self.command().await?;
        let count = self
            .elements
            .iter()
            .filter(|e| e.searches.iter().any(|s| s == query))
            .count();
        self.open_searches.fetch_add(1, Ordering::SeqCst);
        Ok(SearchSession {
            id: query.to_string(),
            result_count: count,
        })
    }

    async fn search_results(
        &self,
        search: &SearchSession,
        from: usize,
        to: usize,
    ) -> Result<Vec<NodeId>, DevToolsError> {
        self.command().await?;
        Ok(self
            .elements
            .iter()
            .filter(|e| e.searches.iter().any(|s| *s == search.id))
            .skip(from)
            .take(to.saturating_sub(from))
            .map(|e| NodeId::new(e.id))
            .collect())
    }

    async fn discard_search(&self, _search: SearchSession) -> Result<(), DevToolsError> {
        self.open_searches.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn backend_handle(&self, node: NodeId) -> Result<ElementHandle, DevToolsError> {
        self.command().await?;
        Ok(self.element(node.value())?.handle())
    }

    async fn box_model(&self, handle: ElementHandle) -> Result<Quad, DevToolsError> {
        self.command().await?;
        Ok(Quad::from_rect(&self.element(handle.value())?.rect))
    }

    async fn node_at_point(&self, point: Point) -> Result<Option<ElementHandle>, DevToolsError> {
        self.command().await?;
        // Later elements paint on top.
        Ok(self
            .elements
            .iter()
            .rev()
            .find(|e| e.rect.contains(&point))
            .map(FakeElement::handle))
    }

    async fn describe(&self, handle: ElementHandle) -> Result<NodeDescription, DevToolsError> {
        self.command().await?;
        let element = self.element(handle.value())?;
        Ok(NodeDescription {
            tag: element.tag.clone(),
            attributes: element.attributes.iter().cloned().collect(),
        })
    }

    async fn query_accessibility(&self, query: &AxQuery) -> Result<Vec<AxMatch>, DevToolsError> {
        self.command().await?;
        if !self.accessibility {
            return Err(DevToolsError::NotSupported("query_accessibility".into()));
        }
        Ok(self
            .elements
            .iter()
            .filter_map(|e| {
                let role = e.role.as_ref()?;
                let name = e.name.clone().unwrap_or_default();
                let role_ok = query
                    .role
                    .as_ref()
                    .is_none_or(|r| r.eq_ignore_ascii_case(role));
                (role_ok && query.accepts_name(&name)).then(|| AxMatch {
                    handle: (!e.detached).then(|| e.handle()),
                    role: role.clone(),
                    name,
                    states: e.states.clone(),
                })
            })
            .collect())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, DevToolsError> {
        self.command().await?;
        Ok(self.screenshot.clone())
    }

    async fn click_at(&self, point: Point) -> Result<(), DevToolsError> {
        self.command().await?;
        self.clicks.lock().unwrap().push(point);
        Ok(())
    }
}

pub fn fragment(text: &str, rect: Rect, confidence: f64) -> OcrFragment {
    OcrFragment {
        text: text.to_string(),
        bounds: rect,
        confidence,
    }
}

/// OCR engine whose screen content changes over (tokio) time.
pub struct FakeOcr {
    schedule: Vec<(Duration, Vec<OcrFragment>)>,
    started: Instant,
    latency: Duration,
    hangs: bool,
    pub initialized: Arc<AtomicUsize>,
    pub recognized: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    /// Most `recognize` calls ever running at once.
    pub peak_in_flight: Arc<AtomicUsize>,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeOcr {
    /// Always shows the same fragments.
    pub fn showing(fragments: Vec<OcrFragment>) -> Self {
        Self::scheduled(vec![(Duration::ZERO, fragments)])
    }

    /// `(from, fragments)` entries; the latest entry whose offset has passed
    /// is what the screen shows.
    pub fn scheduled(schedule: Vec<(Duration, Vec<OcrFragment>)>) -> Self {
        Self {
            schedule,
            started: Instant::now(),
            latency: Duration::ZERO,
            hangs: false,
            initialized: Arc::new(AtomicUsize::new(0)),
            recognized: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every recognition takes this long.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Recognition never returns.
    pub fn hanging() -> Self {
        Self {
            hangs: true,
            ..Self::showing(vec![])
        }
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn initialize(&mut self) -> Result<(), OcrError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), OcrError> {
        Ok(())
    }

    async fn recognize(&self, _image: &[u8]) -> Result<Vec<OcrFragment>, OcrError> {
        self.recognized.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(self.in_flight.clone());
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if self.hangs {
            std::future::pending::<()>().await;
        }
        let elapsed = self.started.elapsed();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self
            .schedule
            .iter()
            .filter(|(from, _)| *from <= elapsed)
            .last()
            .map(|(_, fragments)| fragments.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Found(f64),
    Missing,
    Broken,
}

/// Evaluator for every kind, answering from a script keyed by
/// `LocatorStrategy::describe()` and recording what it was asked.
pub struct ScriptedEvaluator {
    script: HashMap<String, Outcome>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEvaluator {
    pub fn new(script: Vec<(&LocatorStrategy, Outcome)>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|(s, o)| (s.describe(), o))
                .collect(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl StrategyEvaluator for ScriptedEvaluator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn handles(&self, _kind: StrategyKind) -> bool {
        true
    }

    async fn evaluate(
        &self,
        _page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        let key = strategy.describe();
        self.calls.lock().unwrap().push(key.clone());
        match self.script.get(&key).copied().unwrap_or(Outcome::Missing) {
            Outcome::Found(confidence) => {
                StrategyEvaluation::found(strategy, confidence, Point::new(10.0, 10.0))
            }
            Outcome::Missing => {
                StrategyEvaluation::failed(strategy, LocateError::NotFound(key))
            }
            Outcome::Broken => StrategyEvaluation::failed(
                strategy,
                LocateError::Transport(DevToolsError::ConnectionLost),
            ),
        }
    }
}

/// Sleeps before answering found, to exercise the registry timeout.
pub struct SlowEvaluator {
    pub kind: StrategyKind,
    pub delay: Duration,
}

#[async_trait]
impl StrategyEvaluator for SlowEvaluator {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        kind == self.kind
    }

    async fn evaluate(
        &self,
        _page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        tokio::time::sleep(self.delay).await;
        StrategyEvaluation::found(strategy, 0.9, Point::new(1.0, 1.0))
    }
}

/// Checkout page: a full-page container with a primary button in the middle.
pub fn checkout_page() -> FakePage {
    FakePage::new(vec![
        FakeElement::new(10, "div", Rect::new(0.0, 0.0, 800.0, 600.0)).css("main"),
        FakeElement::new(11, "button", Rect::new(380.0, 280.0, 40.0, 40.0))
            .attr("id", "buy")
            .attr("class", "btn primary")
            .attr("data-testid", "buy-button")
            .css("#buy")
            .css("button.primary")
            .css("[data-testid=\"buy-button\"]")
            .search("//*[@id='buy']")
            .search("//*[text()[normalize-space(.)=\"Buy now\"]]")
            .role("button", "Buy now"),
        FakeElement::new(12, "input", Rect::new(100.0, 100.0, 200.0, 30.0))
            .attr("placeholder", "Email")
            .css("[placeholder=\"Email\"]")
            .role("textbox", "Email address"),
    ])
}
