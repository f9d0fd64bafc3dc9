//! In-memory browser used by the engine tests.
//!
//! A [`FakePage`] holds a flat list of elements keyed by the exact CSS string
//! that finds them. Element text and visibility can follow a timeline on the
//! (paused) tokio clock, and click hooks mutate the DOM the way the real
//! application would after a button press.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pagepilot_protocols::{
    BoundingBox, BrowserConnection, BrowserConnector, BrowserPage, DownloadEvent, ElementHandle,
    ElementState, PageError, DEFAULT_CONTEXT,
};
use serde_json::Value;
use tokio::time::Instant;

use crate::session::{SessionManager, SessionOptions};

type ClickHook = Box<dyn FnMut(&mut FakeDom) + Send>;

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub css: String,
    pub text: String,
    /// `(at, text)` pairs; the latest entry at or before now wins over `text`.
    pub timeline: Vec<(Duration, String)>,
    pub attributes: HashMap<String, String>,
    pub visible: bool,
    pub visible_from: Duration,
    pub visible_until: Option<Duration>,
    pub disabled: bool,
    pub removed: bool,
}

impl FakeElement {
    pub fn new(css: &str) -> Self {
        Self {
            css: css.to_string(),
            text: String::new(),
            timeline: Vec::new(),
            attributes: HashMap::new(),
            visible: true,
            visible_from: Duration::ZERO,
            visible_until: None,
            disabled: false,
            removed: false,
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn between(mut self, from: Duration, until: Option<Duration>) -> Self {
        self.visible_from = from;
        self.visible_until = until;
        self
    }

    pub fn timeline(mut self, entries: Vec<(Duration, String)>) -> Self {
        self.timeline = entries;
        self
    }

    fn current_text(&self, now: Duration) -> String {
        self.timeline
            .iter()
            .filter(|(at, _)| *at <= now)
            .last()
            .map(|(_, text)| text.clone())
            .unwrap_or_else(|| self.text.clone())
    }

    fn is_visible(&self, now: Duration) -> bool {
        self.visible
            && now >= self.visible_from
            && self.visible_until.is_none_or(|until| now < until)
    }
}

/// Mutable page state.
pub struct FakeDom {
    /// Time since the page was created.
    pub now: Duration,
    pub url: String,
    pub elements: Vec<FakeElement>,
    pub invalid_selectors: HashSet<String>,
    /// Navigation lands here instead of the requested URL.
    pub redirect: Option<String>,
    /// All operations fail with "Target closed" from this time on.
    pub close_at: Option<Duration>,
    pub closed: bool,
    pub requests: Vec<String>,
    pub blobs: HashMap<String, String>,
    pub download: Option<DownloadEvent>,
    pub last_fill: String,
    pub fills: Vec<String>,
    /// `(element id, files)` per file-input assignment.
    pub uploads: Vec<(String, Vec<PathBuf>)>,
    pub keys: Vec<String>,
    pub clicks: Vec<String>,
    pub navigations: Vec<String>,
    pub downloads_requested: usize,
    hooks: HashMap<String, ClickHook>,
}

impl FakeDom {
    /// Append an element and return its id.
    pub fn add(&mut self, element: FakeElement) -> String {
        self.elements.push(element);
        (self.elements.len() - 1).to_string()
    }

    pub fn count(&self, css: &str) -> usize {
        self.elements
            .iter()
            .filter(|e| e.css == css && !e.removed)
            .count()
    }

    pub fn element_mut(&mut self, id: &str) -> Option<&mut FakeElement> {
        id.parse::<usize>().ok().and_then(|i| self.elements.get_mut(i))
    }

    fn element(&self, handle: &ElementHandle) -> Result<&FakeElement, PageError> {
        handle
            .id
            .parse::<usize>()
            .ok()
            .and_then(|i| self.elements.get(i))
            .filter(|e| !e.removed)
            .ok_or_else(|| PageError::StaleElement(handle.id.clone()))
    }
}

pub struct FakePage {
    origin: Instant,
    dom: Mutex<FakeDom>,
}

impl FakePage {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            dom: Mutex::new(FakeDom {
                now: Duration::ZERO,
                url: url.to_string(),
                elements: Vec::new(),
                invalid_selectors: HashSet::new(),
                redirect: None,
                close_at: None,
                closed: false,
                requests: Vec::new(),
                blobs: HashMap::new(),
                download: None,
                last_fill: String::new(),
                fills: Vec::new(),
                uploads: Vec::new(),
                keys: Vec::new(),
                clicks: Vec::new(),
                navigations: Vec::new(),
                downloads_requested: 0,
                hooks: HashMap::new(),
            }),
        })
    }

    pub fn blank() -> Arc<Self> {
        Self::new("about:blank")
    }

    /// Add an element and return its id.
    pub fn add(&self, element: FakeElement) -> String {
        self.dom.lock().add(element)
    }

    /// Run `hook` every time the element with `id` is clicked.
    pub fn on_click(&self, id: &str, hook: impl FnMut(&mut FakeDom) + Send + 'static) {
        self.dom.lock().hooks.insert(id.to_string(), Box::new(hook));
    }

    pub fn with_dom<R>(&self, f: impl FnOnce(&mut FakeDom) -> R) -> R {
        f(&mut *self.dom.lock())
    }

    pub fn clicks(&self) -> Vec<String> {
        self.dom.lock().clicks.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.dom.lock().keys.clone()
    }

    pub fn fills(&self) -> Vec<String> {
        self.dom.lock().fills.clone()
    }

    pub fn uploads(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.dom.lock().uploads.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.dom.lock().navigations.clone()
    }

    /// Lock the DOM, advance its clock and fail if the page is gone.
    fn live(&self) -> Result<parking_lot::MutexGuard<'_, FakeDom>, PageError> {
        let mut dom = self.dom.lock();
        dom.now = self.origin.elapsed();
        if dom.close_at.is_some_and(|at| dom.now >= at) {
            dom.closed = true;
        }
        if dom.closed {
            return Err(PageError::TargetClosed(
                "Target page, context or browser has been closed".to_string(),
            ));
        }
        Ok(dom)
    }

    fn press(&self, handle: &ElementHandle) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.element(handle)?;
        dom.clicks.push(handle.id.clone());
        if let Some(mut hook) = dom.hooks.remove(&handle.id) {
            hook(&mut *dom);
            dom.hooks.entry(handle.id.clone()).or_insert(hook);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let dom = self.live()?;
        if dom.invalid_selectors.contains(selector) {
            return Err(PageError::InvalidSelector {
                selector: selector.to_string(),
                message: "SyntaxError".to_string(),
            });
        }
        Ok(dom
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.css == selector && !e.removed)
            .map(|(i, _)| ElementHandle::new(i.to_string(), selector))
            .collect())
    }

    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, PageError> {
        let dom = self.live()?;
        let el = dom.element(element)?;
        let visible = el.is_visible(dom.now);
        Ok(ElementState {
            bounding_box: visible.then_some(BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 120.0,
                height: 24.0,
            }),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            disabled: el.disabled,
        })
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, PageError> {
        let dom = self.live()?;
        Ok(dom.element(element)?.current_text(dom.now))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        let dom = self.live()?;
        Ok(dom.element(element)?.attributes.get(name).cloned())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.press(element)
    }

    async fn js_click(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.press(element)
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.element(element)?;
        dom.last_fill = text.to_string();
        dom.fills.push(text.to_string());
        Ok(())
    }

    async fn set_input_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.element(element)?;
        dom.uploads.push((element.id.clone(), files.to_vec()));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.last_fill.push_str(text);
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.keys.push(key.to_string());
        if let Some(mut hook) = dom.hooks.remove(&format!("key:{}", key)) {
            hook(&mut *dom);
            dom.hooks.entry(format!("key:{}", key)).or_insert(hook);
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut dom = self.live()?;
        dom.navigations.push(url.to_string());
        dom.url = dom.redirect.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.live()?.url.clone())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value, PageError> {
        self.live()?;
        Ok(Value::Null)
    }

    async fn fetch_as_data_url(&self, url: &str) -> Result<String, PageError> {
        let dom = self.live()?;
        dom.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| PageError::Script(format!("TypeError: Failed to fetch {}", url)))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        self.live()?;
        std::fs::write(path, b"\x89PNG fake")?;
        Ok(())
    }

    async fn click_and_wait_download(
        &self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<DownloadEvent, PageError> {
        self.press(element)?;
        let download = {
            let mut dom = self.live()?;
            dom.downloads_requested += 1;
            dom.download.clone()
        };
        match download {
            Some(event) => Ok(event),
            None => {
                tokio::time::sleep(timeout).await;
                Err(PageError::Timeout("download did not start".to_string()))
            }
        }
    }

    fn observed_requests(&self) -> Vec<String> {
        self.dom.lock().requests.clone()
    }

    fn is_closed(&self) -> bool {
        let mut dom = self.dom.lock();
        dom.now = self.origin.elapsed();
        dom.closed || dom.close_at.is_some_and(|at| dom.now >= at)
    }

    async fn close(&self) -> Result<(), PageError> {
        self.dom.lock().closed = true;
        Ok(())
    }
}

/// Hands out scripted pages, one per `new_page` call, across connections.
pub struct FakeConnector {
    pages: Arc<Mutex<VecDeque<Arc<FakePage>>>>,
    contexts: Vec<String>,
    pub connects: AtomicUsize,
    pub created_contexts: Arc<Mutex<Vec<String>>>,
    pub closed_contexts: Arc<Mutex<Vec<String>>>,
    keep_created: bool,
    refuse: bool,
}

impl FakeConnector {
    pub fn new(pages: Vec<Arc<FakePage>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(pages.into())),
            contexts: vec![DEFAULT_CONTEXT.to_string()],
            connects: AtomicUsize::new(0),
            created_contexts: Arc::new(Mutex::new(Vec::new())),
            closed_contexts: Arc::new(Mutex::new(Vec::new())),
            keep_created: true,
            refuse: false,
        }
    }

    /// A browser that reports no contexts, so one must be created.
    pub fn without_contexts(mut self) -> Self {
        self.contexts.clear();
        self
    }

    /// Contexts created over one connection are not listed by the next.
    pub fn forgets_created(mut self) -> Self {
        self.keep_created = false;
        self
    }

    /// A browser that is not listening.
    pub fn unreachable() -> Self {
        let mut connector = Self::new(Vec::new());
        connector.refuse = true;
        connector
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn BrowserConnection>, PageError> {
        if self.refuse {
            return Err(PageError::ConnectionFailed(format!(
                "{}: connection refused",
                endpoint
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            pages: self.pages.clone(),
            contexts: self.contexts.clone(),
            created: self.created_contexts.clone(),
            closed: self.closed_contexts.clone(),
            listed_created: if self.keep_created {
                None
            } else {
                Some(self.created_contexts.lock().len())
            },
        }))
    }
}

struct FakeConnection {
    pages: Arc<Mutex<VecDeque<Arc<FakePage>>>>,
    contexts: Vec<String>,
    created: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
    /// When set, only contexts created after the first this many are listed.
    listed_created: Option<usize>,
}

#[async_trait]
impl BrowserConnection for FakeConnection {
    fn is_connected(&self) -> bool {
        true
    }

    async fn contexts(&self) -> Result<Vec<String>, PageError> {
        let mut contexts = self.contexts.clone();
        let skip = self.listed_created.unwrap_or(0);
        contexts.extend(self.created.lock().iter().skip(skip).cloned());
        Ok(contexts)
    }

    async fn create_context(&self) -> Result<String, PageError> {
        let mut created = self.created.lock();
        let id = format!("ctx-{}", created.len() + 1);
        created.push(id.clone());
        Ok(id)
    }

    async fn close_context(&self, context_id: &str) -> Result<(), PageError> {
        self.closed.lock().push(context_id.to_string());
        Ok(())
    }

    async fn new_page(&self, _context_id: &str) -> Result<Arc<dyn BrowserPage>, PageError> {
        let page = self
            .pages
            .lock()
            .pop_front()
            .ok_or_else(|| PageError::ConnectionFailed("no more scripted pages".to_string()))?;
        Ok(page)
    }
}

/// Session over scripted pages, without navigation or login checks.
pub fn session_for(pages: Vec<Arc<FakePage>>) -> SessionManager {
    let options = SessionOptions {
        endpoint: "http://localhost:9222".to_string(),
        goto_url: None,
        login: pagepilot_config::LoginCheck {
            markers: Vec::new(),
            required: None,
        },
        settle: Duration::from_millis(100),
        element_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(100),
    };
    SessionManager::new(Arc::new(FakeConnector::new(pages)), options)
}
