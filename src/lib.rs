//! mdsnap
//!
//! Turns Markdown, HTML, plain text or a live URL into a PNG image or a PDF
//! document. The document is normalised to HTML, merged into a themed
//! template and handed to a headless browser engine for capture.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Swappable engines**: the pipeline only talks to the [`Engine`] and
//!   [`Launcher`] traits; [`fake::FakeLauncher`] stands in for Chrome in tests
//! - **Safe mode**: remote input rejected, scripts disabled, optional network allow-list
//!
//! # Example
//!
//! ```no_run
//! use mdsnap::{convert::{ConversionRequest, Source}, InputFormat, OutputFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ConversionRequest::new(
//!     Source::Inline("# Hello\n\nWorld".into()),
//!     "hello.png",
//!     OutputFormat::Png,
//! )
//! .with_input_format(InputFormat::Markdown);
//!
//! let result = mdsnap::convert::convert(&mdsnap::cdp::CdpLauncher, &request)?;
//! println!("wrote {}", result.output_path.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::str::FromStr;

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod content;
pub mod convert;
pub mod driver;
pub mod fake;
pub mod meta;
pub mod safety;
pub mod template;
pub mod viewport;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly conversion entry point (worker-thread backed)
#[cfg(feature = "cdp")]
pub mod async_api;

pub use capture::{CaptureMode, CapturePolicy};
pub use convert::{convert, ConversionRequest, RenderOptions, RenderResult, Source};
pub use meta::RenderMeta;
pub use safety::SafetyPolicy;

/// Environment variable consulted for the browser binary path
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

/// Configuration handed to a [`Launcher`] when starting an engine
///
/// Defaults are conservative: JavaScript on, sandbox on, 30 second timeout.
///
/// # Examples
///
/// ```
/// let cfg = mdsnap::EngineConfig::default();
/// assert_eq!(cfg.timeout_ms, 30000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Device pixel ratio used for rasterisation
    pub device_scale_factor: f64,
    /// Timeout for navigation and capture in milliseconds
    pub timeout_ms: u64,
    /// Whether page scripts may run
    pub enable_javascript: bool,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Explicit browser binary; falls back to `CHROME_PATH`, then auto-detection
    pub chrome_path: Option<PathBuf>,
    /// Run the browser inside its sandbox
    pub sandbox: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            device_scale_factor: 1.0,
            timeout_ms: 30000,
            enable_javascript: true,
            user_agent: format!("Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome mdsnap/{}", env!("CARGO_PKG_VERSION")),
            chrome_path: std::env::var_os(CHROME_PATH_ENV).map(PathBuf::from),
            sandbox: true,
        }
    }
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 630,
        }
    }
}

/// Declared format of the input text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    #[default]
    Markdown,
    Html,
    Text,
}

impl FromStr for InputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(InputFormat::Markdown),
            "html" | "htm" => Ok(InputFormat::Html),
            "text" | "txt" => Ok(InputFormat::Text),
            other => Err(Error::InvalidOption(format!("unknown input format '{}'", other))),
        }
    }
}

/// Output artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Pdf,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// Lifecycle event the navigation waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

impl FromStr for WaitUntil {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "load" => Ok(WaitUntil::Load),
            "domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
            "networkidle" => Ok(WaitUntil::NetworkIdle),
            other => Err(Error::InvalidWaitPolicy(other.to_string())),
        }
    }
}

impl std::fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        };
        f.write_str(s)
    }
}

/// A rectangle in page coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Region handed to [`Engine::capture_png`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureRegion {
    /// Exactly this rectangle
    Clip(ClipRect),
    /// The entire scrollable page
    FullPage,
}

/// Paper size for PDF output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperFormat {
    #[default]
    A4,
    Letter,
    Legal,
}

impl PaperFormat {
    /// Paper width and height in inches (portrait)
    pub fn inches(self) -> (f64, f64) {
        match self {
            PaperFormat::A4 => (8.27, 11.69),
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PaperFormat::A4),
            "letter" => Ok(PaperFormat::Letter),
            "legal" => Ok(PaperFormat::Legal),
            other => Err(Error::InvalidOption(format!("unknown paper format '{}'", other))),
        }
    }
}

/// Page setup for PDF output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    pub format: PaperFormat,
    pub landscape: bool,
    /// Uniform margin in inches
    pub margin_in: f64,
    pub print_background: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            landscape: false,
            margin_in: 0.4,
            print_background: true,
        }
    }
}

/// Identity of the engine that produced an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    /// Short engine identifier such as "chromium"
    pub name: String,
    /// Product version string reported by the engine
    pub version: String,
}

/// Information about an outgoing network request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Unique request identifier (backend-specific)
    pub request_id: String,
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
}

/// Decision returned by an interception handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Let the request proceed normally
    Continue,
    /// Abort the request
    Fail { reason: String },
}

/// Browser capability the render driver works against
///
/// The production implementation is [`cdp::CdpEngine`]; [`fake::FakeEngine`]
/// records calls and returns canned bytes.
pub trait Engine {
    /// Engine name and version for the metadata sidecar
    fn version(&self) -> Result<EngineVersion>;

    /// Install a handler that decides the fate of every outgoing request.
    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static;

    /// Navigate to a URL and wait for the given lifecycle event
    fn load_url(&mut self, url: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()>;

    /// Replace the page document with `html` and wait for the given lifecycle event
    fn set_content(&mut self, html: &str, wait: WaitUntil, timeout_ms: u64) -> Result<()>;

    /// Block until web fonts have finished loading
    fn wait_for_fonts(&mut self, timeout_ms: u64) -> Result<()>;

    /// Remove every `<script>` element from the live DOM; returns how many were removed
    fn remove_scripts(&mut self) -> Result<usize>;

    /// Bounding box of the first element matching `selector`, if any
    fn element_rect(&mut self, selector: &str) -> Result<Option<ClipRect>>;

    /// Capture the given region as PNG bytes
    fn capture_png(&mut self, region: &CaptureRegion) -> Result<Vec<u8>>;

    /// Print the current page to PDF bytes
    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>>;

    /// Close the engine and tear down the browser process
    fn close(self) -> Result<()>;
}

/// Starts engines; one engine per conversion
pub trait Launcher {
    type Engine: Engine;

    fn launch(&self, config: &EngineConfig) -> Result<Self::Engine>;
}
