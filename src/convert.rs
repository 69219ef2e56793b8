//! Conversion pipeline
//!
//! `ConversionRequest` is validated into an immutable [`RenderPlan`] before any
//! engine work. The plan then flows through normalisation, templating and the
//! render driver; outputs are only written once capture has succeeded.

use crate::capture::CaptureMode;
use crate::content::{self, NormalizeOptions};
use crate::driver::{DriveJob, PageSource, RenderDriver};
use crate::meta::{MetaInput, RenderMeta};
use crate::safety::{self, SafetyPolicy};
use crate::template::{TemplateRegistry, DEFAULT_STYLE};
use crate::viewport::{self, ResolvedViewport};
use crate::{
    ClipRect, EngineConfig, Error, InputFormat, Launcher, OutputFormat, PdfOptions, Result, WaitUntil,
};
use log::{debug, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Title used when nothing better is available
pub const FALLBACK_TITLE: &str = "Document";

/// Where the document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Local file; a path that is really an `http(s)://` URL is treated as [`Source::Url`]
    Path(PathBuf),
    /// Content passed directly
    Inline(String),
    /// Live page to navigate to
    Url(String),
    /// Read everything from standard input
    Stdin,
}

/// Raw rendering options as supplied by the CLI or a library caller
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub preset: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: f64,
    /// `x,y,width,height`
    pub clip: Option<String>,
    pub full_page: bool,
    pub safe: bool,
    pub allow_scripts: bool,
    pub network_allowlist: Vec<String>,
    /// `load`, `domcontentloaded` or `networkidle`; `None` means `networkidle`
    pub wait_until: Option<String>,
    pub timeout_ms: u64,
    /// Stylesheet merged into the template
    pub css_file: Option<PathBuf>,
    pub title: Option<String>,
    pub toc: bool,
    /// Keep the intermediate HTML next to the artifact
    pub keep_html: bool,
    pub templates_dir: Option<PathBuf>,
    pub pdf: PdfOptions,
    pub chrome_path: Option<PathBuf>,
    pub sandbox: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            preset: None,
            width: None,
            height: None,
            scale: 1.0,
            clip: None,
            full_page: false,
            safe: false,
            allow_scripts: false,
            network_allowlist: Vec::new(),
            wait_until: None,
            timeout_ms: 30000,
            css_file: None,
            title: None,
            toc: false,
            keep_html: true,
            templates_dir: None,
            pdf: PdfOptions::default(),
            chrome_path: None,
            sandbox: true,
        }
    }
}

/// One conversion, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// `None` fails with [`Error::MissingInput`]
    pub source: Option<Source>,
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Declared input format; guessed from the file extension when unset
    pub input_format: Option<InputFormat>,
    pub style: String,
    pub options: RenderOptions,
}

impl ConversionRequest {
    pub fn new(source: Source, output: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            source: Some(source),
            output: output.into(),
            format,
            input_format: None,
            style: DEFAULT_STYLE.to_string(),
            options: RenderOptions::default(),
        }
    }

    pub fn with_input_format(mut self, format: InputFormat) -> Self {
        self.input_format = Some(format);
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate everything that can be checked without touching the engine.
    ///
    /// Checks run in a fixed order: missing input, unsafe URL, wait policy,
    /// clip, then viewport and scale.
    pub fn plan(&self) -> Result<RenderPlan> {
        let source = match &self.source {
            None => return Err(Error::MissingInput),
            Some(Source::Path(p)) if p.as_os_str().is_empty() => return Err(Error::MissingInput),
            Some(Source::Path(p)) => match p.to_str() {
                Some(s) if safety::is_remote_url(s) => Source::Url(s.trim().to_string()),
                _ => Source::Path(p.clone()),
            },
            Some(Source::Url(u)) if u.trim().is_empty() => return Err(Error::MissingInput),
            Some(other) => other.clone(),
        };

        let opts = &self.options;
        let safety = SafetyPolicy::new(opts.safe, opts.allow_scripts, opts.network_allowlist.clone());
        if let Source::Url(url) = &source {
            safety.check_source_url(url)?;
        }

        let wait = match &opts.wait_until {
            Some(raw) => raw.parse::<WaitUntil>()?,
            None => WaitUntil::default(),
        };

        let clip = opts.clip.as_deref().map(viewport::parse_clip).transpose()?;
        let viewport = viewport::resolve(
            opts.preset.as_deref(),
            opts.width,
            opts.height,
            opts.scale,
            clip.as_ref(),
        )?;

        if opts.timeout_ms == 0 {
            return Err(Error::InvalidOption("timeout must be greater than 0".to_string()));
        }
        if !opts.pdf.margin_in.is_finite() || opts.pdf.margin_in < 0.0 {
            return Err(Error::InvalidOption(format!("invalid PDF margin {}", opts.pdf.margin_in)));
        }

        let input_format = self.input_format.unwrap_or_else(|| match &source {
            Source::Path(p) => guess_input_format(p),
            _ => InputFormat::Markdown,
        });

        Ok(RenderPlan {
            source,
            output: self.output.clone(),
            format: self.format,
            input_format,
            style: self.style.clone(),
            viewport,
            safety,
            wait,
            timeout_ms: opts.timeout_ms,
            clip,
            full_page: opts.full_page,
            options: opts.clone(),
        })
    }
}

/// Guess the input format from a file extension; anything unknown is Markdown.
pub fn guess_input_format(path: &Path) -> InputFormat {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("html") | Some("htm") => InputFormat::Html,
        Some("txt") | Some("text") => InputFormat::Text,
        _ => InputFormat::Markdown,
    }
}

/// Validated request
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub source: Source,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub input_format: InputFormat,
    pub style: String,
    pub viewport: ResolvedViewport,
    pub safety: SafetyPolicy,
    pub wait: WaitUntil,
    pub timeout_ms: u64,
    pub clip: Option<ClipRect>,
    pub full_page: bool,
    options: RenderOptions,
}

impl RenderPlan {
    /// Engine configuration derived from the plan
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            viewport: self.viewport.viewport,
            device_scale_factor: self.viewport.scale,
            timeout_ms: self.timeout_ms,
            enable_javascript: self.safety.javascript_enabled(),
            chrome_path: self.options.chrome_path.clone().or(defaults.chrome_path),
            sandbox: self.options.sandbox,
            user_agent: defaults.user_agent,
        }
    }

    /// Intermediate HTML and sidecar paths for this plan's output
    pub fn output_paths(&self) -> OutputPaths {
        OutputPaths::for_output(&self.output)
    }

    pub fn pdf_options(&self) -> PdfOptions {
        self.options.pdf
    }
}

/// Files produced next to the artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub artifact: PathBuf,
    pub html: PathBuf,
    pub meta: PathBuf,
}

impl OutputPaths {
    /// `dir/name.ext` gives `dir/name.html` and `dir/name.meta.json`.
    pub fn for_output(output: &Path) -> Self {
        Self {
            artifact: output.to_path_buf(),
            html: output.with_extension("html"),
            meta: output.with_extension("meta.json"),
        }
    }
}

/// What a finished conversion produced
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub output_path: PathBuf,
    pub html_path: Option<PathBuf>,
    pub meta_path: PathBuf,
    pub meta: RenderMeta,
}

impl RenderResult {
    pub fn capture_mode(&self) -> CaptureMode {
        self.meta.capture_mode
    }
}

/// The document handed to the engine, plus the bytes it was built from
#[derive(Debug, Clone)]
pub struct PreparedPage {
    /// Full HTML document; `None` for URL sources
    pub html: Option<String>,
    /// Hashed into the sidecar: raw source content, or the URL itself
    pub source_bytes: Vec<u8>,
    pub title: Option<String>,
}

fn read_source(source: &Source) -> Result<(String, Option<PathBuf>)> {
    match source {
        Source::Path(path) => {
            let text = std::fs::read_to_string(path)?;
            let base_dir = path.parent().map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p });
            Ok((text, base_dir.map(Path::to_path_buf)))
        }
        Source::Inline(text) => Ok((text.clone(), None)),
        Source::Stdin => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok((text, None))
        }
        Source::Url(_) => Err(Error::InvalidOption("URL sources are not read as documents".to_string())),
    }
}

/// `--title`, then the first `<h1>`, then the file stem, then [`FALLBACK_TITLE`].
pub fn resolve_title(explicit: Option<&str>, body: &str, source: &Source) -> String {
    if let Some(t) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return t.to_string();
    }
    if let Some(t) = content::extract_title(body) {
        return t;
    }
    if let Source::Path(p) = source {
        if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
            return stem.to_string();
        }
    }
    FALLBACK_TITLE.to_string()
}

/// Read, normalise and template the document. URL sources pass straight through.
pub fn prepare_page(plan: &RenderPlan) -> Result<PreparedPage> {
    if let Source::Url(url) = &plan.source {
        return Ok(PreparedPage { html: None, source_bytes: url.as_bytes().to_vec(), title: None });
    }

    let (raw, base_dir) = read_source(&plan.source)?;
    let options = NormalizeOptions {
        scripts_allowed: plan.safety.scripts_allowed,
        toc: plan.options.toc,
        base_dir,
    };
    let body = content::normalize(&raw, plan.input_format, &options);
    let title = resolve_title(plan.options.title.as_deref(), &body, &plan.source);

    let css = match &plan.options.css_file {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };

    let registry = TemplateRegistry::new(plan.options.templates_dir.clone());
    let html = registry.render(&plan.style, &title, &body, css.as_deref())?;
    debug!("Rendered {} bytes of HTML with style '{}'", html.len(), plan.style);

    Ok(PreparedPage { html: Some(html), source_bytes: raw.into_bytes(), title: Some(title) })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Run one conversion end to end with engines from `launcher`.
pub fn convert<L: Launcher>(launcher: &L, request: &ConversionRequest) -> Result<RenderResult> {
    let plan = request.plan()?;
    let page = prepare_page(&plan)?;

    let source = match (&plan.source, &page.html) {
        (Source::Url(url), _) => PageSource::Url(url),
        (_, Some(html)) => PageSource::Html(html),
        (_, None) => return Err(Error::MissingInput),
    };

    let job = DriveJob {
        config: plan.engine_config(),
        source,
        wait: plan.wait,
        timeout_ms: plan.timeout_ms,
        safety: &plan.safety,
        format: plan.format,
        clip: plan.clip,
        full_page: plan.full_page,
        pdf: plan.pdf_options(),
    };
    let captured = RenderDriver::new(launcher).run(&job)?;

    let meta = RenderMeta::new(
        MetaInput {
            engine: captured.engine.clone(),
            preset: &plan.viewport.preset,
            width: plan.viewport.viewport.width,
            height: plan.viewport.viewport.height,
            device_scale_factor: plan.viewport.scale,
            style: &plan.style,
            format: plan.format,
            capture_mode: captured.mode,
            source: &page.source_bytes,
        },
        chrono::Utc::now(),
    );

    let paths = plan.output_paths();
    write_file(&paths.artifact, &captured.bytes)?;

    let html_path = match &page.html {
        Some(html) if plan.options.keep_html => {
            if paths.html == paths.artifact {
                warn!("Output path ends in .html; not writing intermediate HTML over it");
                None
            } else if is_source_file(&plan.source, &paths.html) {
                warn!("{} is the input file; not writing intermediate HTML over it", paths.html.display());
                None
            } else {
                write_file(&paths.html, html.as_bytes())?;
                Some(paths.html.clone())
            }
        }
        _ => None,
    };

    meta.write_to(&paths.meta)?;
    info!("Wrote {}", paths.meta.display());

    Ok(RenderResult { output_path: paths.artifact, html_path, meta_path: paths.meta, meta })
}

fn is_source_file(source: &Source, path: &Path) -> bool {
    let Source::Path(input) = source else {
        return false;
    };
    match (std::fs::canonicalize(input), std::fs::canonicalize(path)) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == path,
    }
}
