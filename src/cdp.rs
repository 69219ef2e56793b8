//! Chrome DevTools Protocol engine (uses the `headless_chrome` crate)

use crate::{
    CaptureRegion, ClipRect, Engine, EngineConfig, EngineVersion, Error, Launcher, PdfOptions, RequestAction,
    RequestInfo, Result, WaitUntil,
};
use base64::{engine::general_purpose, Engine as _};
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::{Emulation, Network, Page};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::Deserialize;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::{Duration, Instant};

const INSTALL_HINT: &str = "Install Chrome or Chromium, or set CHROME_PATH to the browser binary";

/// How long the resource count must stay unchanged for `networkidle`
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const READY_STATE_JS: &str = "document.readyState";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";
const FONTS_STATUS_JS: &str = "document.fonts ? document.fonts.status : 'loaded'";
const REMOVE_SCRIPTS_JS: &str = r#"(function() {
    const scripts = document.querySelectorAll('script');
    scripts.forEach(s => s.remove());
    return scripts.length;
})()"#;
const PAGE_SIZE_JS: &str = r#"JSON.stringify({
    x: 0,
    y: 0,
    width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
    height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
})"#;

#[derive(Debug, Deserialize)]
struct JsRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<JsRect> for ClipRect {
    fn from(r: JsRect) -> Self {
        ClipRect { x: r.x, y: r.y, width: r.width, height: r.height }
    }
}

fn element_rect_js(selector: &str) -> Result<String> {
    let quoted = serde_json::to_string(selector)?;
    Ok(format!(
        r#"(function(sel) {{
    const el = document.querySelector(sel);
    if (!el) return null;
    const r = el.getBoundingClientRect();
    return JSON.stringify({{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }});
}})({})"#,
        quoted
    ))
}

/// Starts a headless Chrome per conversion
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

impl Launcher for CdpLauncher {
    type Engine = CdpEngine;

    fn launch(&self, config: &EngineConfig) -> Result<CdpEngine> {
        CdpEngine::new(config.clone())
    }
}

/// Headless Chrome with a single tab
pub struct CdpEngine {
    browser: Browser,
    tab: Arc<Tab>,
    config: EngineConfig,
}

impl CdpEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let unavailable = |reason: String| Error::RenderEngineUnavailable { reason, hint: INSTALL_HINT.to_string() };

        let scale_arg = OsString::from(format!("--force-device-scale-factor={}", config.device_scale_factor));
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .args(vec![scale_arg.as_os_str()])
            .idle_browser_timeout(Duration::from_millis(config.timeout_ms.saturating_mul(2)))
            .build()
            .map_err(|e| unavailable(format!("invalid launch options: {}", e)))?;

        let browser = Browser::new(launch_options).map_err(|e| unavailable(format!("failed to launch browser: {}", e)))?;
        let tab = browser.new_tab().map_err(|e| unavailable(format!("failed to open tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| Error::Engine(format!("Failed to set user agent: {}", e)))?;

        if !config.enable_javascript {
            tab.call_method(Emulation::SetScriptExecutionDisabled { value: true })
                .map_err(|e| Error::Engine(format!("Failed to disable scripts: {}", e)))?;
        }

        debug!(
            "Launched headless Chrome {}x{} @{}x",
            config.viewport.width, config.viewport.height, config.device_scale_factor
        );
        Ok(Self { browser, tab, config })
    }

    fn eval(&self, expression: &str, await_promise: bool) -> Result<Option<serde_json::Value>> {
        let remote = self
            .tab
            .evaluate(expression, await_promise)
            .map_err(|e| Error::Engine(format!("Evaluation failed: {}", e)))?;
        Ok(remote.value.filter(|v| !v.is_null()))
    }

    fn eval_rect(&self, expression: &str) -> Result<Option<ClipRect>> {
        match self.eval(expression, false)? {
            Some(serde_json::Value::String(json)) => Ok(Some(serde_json::from_str::<JsRect>(&json)?.into())),
            Some(other) => Err(Error::Engine(format!("Unexpected rect value: {}", other))),
            None => Ok(None),
        }
    }

    /// Poll until the document reaches `wait` or `deadline` passes.
    fn wait_for_state(&self, wait: WaitUntil, deadline: Instant, timeout_ms: u64) -> Result<()> {
        let mut resources: Option<(u64, Instant)> = None;
        loop {
            let state = self.eval(READY_STATE_JS, false)?;
            let state = state.as_ref().and_then(|v| v.as_str()).unwrap_or("loading");
            let ready = match wait {
                WaitUntil::DomContentLoaded => state != "loading",
                WaitUntil::Load | WaitUntil::NetworkIdle => state == "complete",
            };

            if ready && wait != WaitUntil::NetworkIdle {
                return Ok(());
            }
            if ready {
                let count = self.eval(RESOURCE_COUNT_JS, false)?.and_then(|v| v.as_u64()).unwrap_or(0);
                match resources {
                    Some((seen, since)) if seen == count => {
                        if since.elapsed() >= NETWORK_IDLE_QUIET {
                            return Ok(());
                        }
                    }
                    _ => resources = Some((count, Instant::now())),
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::NavigationTimeout(timeout_ms));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Engine for CdpEngine {
    fn version(&self) -> Result<EngineVersion> {
        let v = self.browser.get_version()?;
        Ok(EngineVersion { name: "chromium".to_string(), version: v.product })
    }

    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static,
    {
        let handler = Arc::new(cb);

        self.tab
            .enable_fetch(None, Some(false))
            .map_err(|e| Error::Engine(format!("Failed to enable fetch domain: {}", e)))?;

        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> =
            Arc::new(move |_transport, _session_id, event: RequestPausedEvent| {
                let info = RequestInfo {
                    request_id: event.params.request_id.clone(),
                    url: event.params.request.url.clone(),
                    method: event.params.request.method.clone(),
                };

                match handler(&info) {
                    RequestAction::Continue => RequestPausedDecision::Continue(None),
                    RequestAction::Fail { reason } => {
                        debug!("Failing {}: {}", info.url, reason);
                        RequestPausedDecision::Fail(FailRequest {
                            request_id: event.params.request_id.clone(),
                            error_reason: Network::ErrorReason::BlockedByClient,
                        })
                    }
                }
            });

        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| Error::Engine(format!("Failed to enable request interception: {}", e)))?;
        Ok(())
    }

    fn load_url(&mut self, url: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::Engine(format!("Navigation failed: {}", e)))?;

        if let Err(e) = self.tab.wait_until_navigated() {
            if started.elapsed() >= Duration::from_millis(timeout_ms) {
                return Err(Error::NavigationTimeout(timeout_ms));
            }
            return Err(Error::Engine(format!("Wait for navigation failed: {}", e)));
        }

        self.wait_for_state(wait, deadline, timeout_ms)
    }

    fn set_content(&mut self, html: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        self.tab
            .navigate_to("about:blank")
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| Error::Engine(format!("Failed to open blank page: {}", e)))?;

        let tree = self
            .tab
            .call_method(Page::GetFrameTree(None))
            .map_err(|e| Error::Engine(format!("Failed to get frame tree: {}", e)))?;
        self.tab
            .call_method(Page::SetDocumentContent { frame_id: tree.frame_tree.frame.id, html: html.to_string() })
            .map_err(|e| Error::Engine(format!("Failed to set document content: {}", e)))?;

        self.wait_for_state(wait, deadline, timeout_ms)
    }

    fn wait_for_fonts(&mut self, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let status = self.eval(FONTS_STATUS_JS, false)?;
            if status.as_ref().and_then(|v| v.as_str()) != Some("loading") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("Fonts still loading after {}ms, capturing anyway", timeout_ms);
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn remove_scripts(&mut self) -> Result<usize> {
        let removed = self.eval(REMOVE_SCRIPTS_JS, false)?.and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(removed as usize)
    }

    fn element_rect(&mut self, selector: &str) -> Result<Option<ClipRect>> {
        self.eval_rect(&element_rect_js(selector)?)
    }

    fn capture_png(&mut self, region: &CaptureRegion) -> Result<Vec<u8>> {
        let rect = match region {
            CaptureRegion::Clip(rect) => *rect,
            CaptureRegion::FullPage => self.eval_rect(PAGE_SIZE_JS)?.unwrap_or(ClipRect {
                x: 0.0,
                y: 0.0,
                width: self.config.viewport.width as f64,
                height: self.config.viewport.height as f64,
            }),
        };

        // Regions below the window are only painted with captureBeyondViewport.
        let clip = Page::Viewport { x: rect.x, y: rect.y, width: rect.width, height: rect.height, scale: 1.0 };
        let shot = self
            .tab
            .call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                clip: Some(clip),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                quality: None,
                optimize_for_speed: None,
            })
            .map_err(|e| Error::Engine(format!("Screenshot failed: {}", e)))?;

        general_purpose::STANDARD
            .decode(shot.data)
            .map_err(|e| Error::Engine(format!("Screenshot data was not base64: {}", e)))
    }

    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        let (paper_width, paper_height) = options.format.inches();
        let margin = Some(options.margin_in);
        let pdf_options = PrintToPdfOptions {
            landscape: Some(options.landscape),
            print_background: Some(options.print_background),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            margin_top: margin,
            margin_bottom: margin,
            margin_left: margin,
            margin_right: margin,
            prefer_css_page_size: Some(false),
            ..Default::default()
        };

        self.tab
            .print_to_pdf(Some(pdf_options))
            .map_err(|e| Error::Engine(format!("PDF printing failed: {}", e)))
    }

    fn close(self) -> Result<()> {
        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close tab cleanly: {}", e);
        }
        // Dropping the browser kills the child process.
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}
