//! In-process fake engine for tests and dry runs
//!
//! `FakeEngine` never starts a browser. It records every call on a log shared
//! with its [`FakeLauncher`], answers selector queries by parsing the loaded
//! document with `scraper`, and returns canned PNG/PDF bytes.

use crate::{
    CaptureRegion, ClipRect, Engine, EngineConfig, EngineVersion, Error, Launcher, PdfOptions, RequestAction,
    RequestInfo, Result, WaitUntil,
};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Bytes returned by [`FakeEngine::capture_png`]: a PNG signature and a marker
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-bitmap";
/// Bytes returned by [`FakeEngine::print_pdf`]
pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n% fake document\n%%EOF\n";

const BLANK_PAGE: &str = "<html><head></head><body></body></html>";

type RequestHandler = Arc<dyn Fn(&RequestInfo) -> RequestAction + Send + Sync>;

/// One recorded engine interaction
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Launch(EngineConfig),
    OnRequest,
    LoadUrl { url: String, wait: WaitUntil, timeout_ms: u64 },
    SetContent { html: String, wait: WaitUntil, timeout_ms: u64 },
    WaitForFonts,
    RemoveScripts,
    ElementRect(String),
    CapturePng(CaptureRegion),
    PrintPdf(PdfOptions),
    Close,
}

#[derive(Default)]
struct Shared {
    calls: Vec<FakeCall>,
    handler: Option<RequestHandler>,
    pages: HashMap<String, String>,
    launch_failure: Option<String>,
    navigation_timeout: bool,
    open_engines: usize,
}

/// Launcher handing out [`FakeEngine`]s that share one call log
#[derive(Clone, Default)]
pub struct FakeLauncher {
    shared: Arc<Mutex<Shared>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch fails as if no browser were installed.
    pub fn unavailable(reason: &str) -> Self {
        let launcher = Self::new();
        launcher.state().launch_failure = Some(reason.to_string());
        launcher
    }

    /// Serve `html` when `url` is loaded.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.state().pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Make every navigation exceed its timeout.
    pub fn with_navigation_timeout(self) -> Self {
        self.state().navigation_timeout = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state().calls.clone()
    }

    /// Engines launched and not yet closed
    pub fn open_engines(&self) -> usize {
        self.state().open_engines
    }

    /// Whether any engine loaded a URL or set page content
    pub fn navigated(&self) -> bool {
        self.state()
            .calls
            .iter()
            .any(|c| matches!(c, FakeCall::LoadUrl { .. } | FakeCall::SetContent { .. }))
    }

    /// Run `url` through the installed interception handler, if any.
    pub fn simulate_request(&self, url: &str) -> Option<RequestAction> {
        let handler = self.state().handler.clone()?;
        let info = RequestInfo { request_id: "fake-1".to_string(), url: url.to_string(), method: "GET".to_string() };
        Some(handler(&info))
    }
}

impl Launcher for FakeLauncher {
    type Engine = FakeEngine;

    fn launch(&self, config: &EngineConfig) -> Result<FakeEngine> {
        let mut state = self.state();
        state.calls.push(FakeCall::Launch(config.clone()));
        if let Some(reason) = &state.launch_failure {
            return Err(Error::RenderEngineUnavailable {
                reason: reason.clone(),
                hint: "The fake launcher was configured to fail".to_string(),
            });
        }
        state.open_engines += 1;
        drop(state);

        Ok(FakeEngine { shared: self.shared.clone(), config: config.clone(), document: BLANK_PAGE.to_string() })
    }
}

/// Recording engine; see the module docs
pub struct FakeEngine {
    shared: Arc<Mutex<Shared>>,
    config: EngineConfig,
    document: String,
}

impl FakeEngine {
    fn record(&self, call: FakeCall) -> MutexGuard<'_, Shared> {
        let mut state = self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.calls.push(call);
        state
    }

    /// Document currently "loaded"
    pub fn document(&self) -> &str {
        &self.document
    }
}

impl Engine for FakeEngine {
    fn version(&self) -> Result<EngineVersion> {
        Ok(EngineVersion { name: "fake".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
    }

    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static,
    {
        let mut state = self.record(FakeCall::OnRequest);
        state.handler = Some(Arc::new(cb));
        Ok(())
    }

    fn load_url(&mut self, url: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()> {
        let state = self.record(FakeCall::LoadUrl { url: url.to_string(), wait, timeout_ms });
        if state.navigation_timeout {
            return Err(Error::NavigationTimeout(timeout_ms));
        }
        let page = state.pages.get(url).cloned().unwrap_or_else(|| BLANK_PAGE.to_string());
        drop(state);
        self.document = page;
        Ok(())
    }

    fn set_content(&mut self, html: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()> {
        let state = self.record(FakeCall::SetContent { html: html.to_string(), wait, timeout_ms });
        if state.navigation_timeout {
            return Err(Error::NavigationTimeout(timeout_ms));
        }
        drop(state);
        self.document = html.to_string();
        Ok(())
    }

    fn wait_for_fonts(&mut self, _timeout_ms: u64) -> Result<()> {
        drop(self.record(FakeCall::WaitForFonts));
        Ok(())
    }

    fn remove_scripts(&mut self) -> Result<usize> {
        drop(self.record(FakeCall::RemoveScripts));
        let selector = Selector::parse("script").map_err(|e| Error::Engine(format!("{:?}", e)))?;
        let count = Html::parse_document(&self.document).select(&selector).count();
        self.document = crate::content::strip_scripts(&self.document);
        Ok(count)
    }

    fn element_rect(&mut self, selector: &str) -> Result<Option<ClipRect>> {
        drop(self.record(FakeCall::ElementRect(selector.to_string())));
        let parsed = Selector::parse(selector)
            .map_err(|e| Error::InvalidOption(format!("invalid selector '{}': {:?}", selector, e)))?;
        let found = Html::parse_document(&self.document).select(&parsed).next().is_some();
        Ok(found.then(|| ClipRect {
            x: 0.0,
            y: 0.0,
            width: self.config.viewport.width as f64,
            height: self.config.viewport.height as f64,
        }))
    }

    fn capture_png(&mut self, region: &CaptureRegion) -> Result<Vec<u8>> {
        drop(self.record(FakeCall::CapturePng(*region)));
        Ok(FAKE_PNG.to_vec())
    }

    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        drop(self.record(FakeCall::PrintPdf(*options)));
        Ok(FAKE_PDF.to_vec())
    }

    fn close(self) -> Result<()> {
        let mut state = self.record(FakeCall::Close);
        state.open_engines = state.open_engines.saturating_sub(1);
        Ok(())
    }
}
