//! mdsnap CLI - render Markdown, HTML or a URL to PNG or PDF

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;

use mdsnap::cdp::CdpLauncher;
use mdsnap::convert::{self, ConversionRequest, RenderOptions, RenderResult, Source};
use mdsnap::template::TemplateRegistry;
use mdsnap::{viewport, InputFormat, OutputFormat, PaperFormat, PdfOptions};

#[derive(Parser)]
#[command(name = "mdsnap")]
#[command(version)]
#[command(about = "Render Markdown, HTML or a web page to PNG or PDF", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render to a PDF document
    Pdf {
        #[command(flatten)]
        common: CommonArgs,

        /// Paper size
        #[arg(long, value_enum, default_value = "a4")]
        paper: PaperArg,

        /// Landscape orientation
        #[arg(long)]
        landscape: bool,

        /// Page margin in inches
        #[arg(long, default_value = "0.4")]
        margin: f64,

        /// Do not print background colors and images
        #[arg(long)]
        no_background: bool,
    },

    /// Render to a PNG image
    #[command(alias = "shot")]
    Snap {
        #[command(flatten)]
        common: CommonArgs,

        /// Capture exactly this rectangle: x,y,width,height
        #[arg(long, value_name = "X,Y,W,H", allow_hyphen_values = true)]
        clip: Option<String>,

        /// Capture the whole scrollable page
        #[arg(long)]
        full_page: bool,
    },

    /// List viewport presets
    Presets,

    /// List available template styles
    Styles {
        /// Directory with additional `<style>.html` templates
        #[arg(long, value_name = "DIR")]
        templates_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Input file, or `-` for stdin
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["content", "url"])]
    input: Option<PathBuf>,

    /// Inline content
    #[arg(long, conflicts_with = "url")]
    content: Option<String>,

    /// Live page to capture
    #[arg(long)]
    url: Option<String>,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Template style
    #[arg(short = 't', long = "template", value_name = "STYLE", default_value = "default")]
    style: String,

    /// Viewport preset
    #[arg(short, long)]
    preset: Option<String>,

    /// Viewport width in pixels (requires --height)
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height in pixels (requires --width)
    #[arg(long)]
    height: Option<u32>,

    /// Device scale factor (1-4)
    #[arg(long, default_value = "1")]
    scale: f64,

    /// Reject remote input and disable page scripts
    #[arg(long)]
    safe: bool,

    /// load, domcontentloaded or networkidle
    #[arg(long, value_name = "EVENT")]
    wait_until: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(long, value_name = "MS", default_value = "30000")]
    timeout: u64,

    /// Input format (guessed from the file extension when omitted)
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Extra stylesheet merged into the template
    #[arg(long, value_name = "FILE")]
    css: Option<PathBuf>,

    /// Document title
    #[arg(long)]
    title: Option<String>,

    /// Replace `[[toc]]` with a table of contents
    #[arg(long)]
    toc: bool,

    /// Do not keep the intermediate HTML
    #[arg(long)]
    no_html: bool,

    /// Allow network requests starting with this prefix (repeatable)
    #[arg(long = "allow", value_name = "PREFIX")]
    allow: Vec<String>,

    /// Keep <script> elements (ignored with --safe)
    #[arg(long)]
    allow_scripts: bool,

    /// Directory with additional `<style>.html` templates
    #[arg(long, value_name = "DIR")]
    templates_dir: Option<PathBuf>,

    /// Browser binary (defaults to $CHROME_PATH, then auto-detection)
    #[arg(long, value_name = "PATH")]
    chrome_path: Option<PathBuf>,

    /// Run the browser without its sandbox
    #[arg(long)]
    no_sandbox: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Markdown,
    Html,
    Text,
}

impl From<FormatArg> for InputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Markdown => InputFormat::Markdown,
            FormatArg::Html => InputFormat::Html,
            FormatArg::Text => InputFormat::Text,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PaperArg {
    A4,
    Letter,
    Legal,
}

impl From<PaperArg> for PaperFormat {
    fn from(p: PaperArg) -> Self {
        match p {
            PaperArg::A4 => PaperFormat::A4,
            PaperArg::Letter => PaperFormat::Letter,
            PaperArg::Legal => PaperFormat::Legal,
        }
    }
}

impl CommonArgs {
    fn source(&self) -> Option<Source> {
        if let Some(path) = &self.input {
            if path.as_os_str() == "-" {
                return Some(Source::Stdin);
            }
            return Some(Source::Path(path.clone()));
        }
        if let Some(content) = &self.content {
            return Some(Source::Inline(content.clone()));
        }
        self.url.clone().map(Source::Url)
    }

    fn into_request(self, format: OutputFormat, pdf: PdfOptions, clip: Option<String>, full_page: bool) -> ConversionRequest {
        let options = RenderOptions {
            preset: self.preset.clone(),
            width: self.width,
            height: self.height,
            scale: self.scale,
            clip,
            full_page,
            safe: self.safe,
            allow_scripts: self.allow_scripts,
            network_allowlist: self.allow.clone(),
            wait_until: self.wait_until.clone(),
            timeout_ms: self.timeout,
            css_file: self.css.clone(),
            title: self.title.clone(),
            toc: self.toc,
            keep_html: !self.no_html,
            templates_dir: self.templates_dir.clone(),
            pdf,
            chrome_path: self.chrome_path.clone(),
            sandbox: !self.no_sandbox,
        };

        ConversionRequest {
            source: self.source(),
            output: self.output,
            format,
            input_format: self.format.map(InputFormat::from),
            style: self.style,
            options,
        }
    }
}

fn report(result: &RenderResult) {
    println!("{}", result.output_path.display());
    if let Some(html) = &result.html_path {
        println!("{}", html.display());
    }
    println!("{}", result.meta_path.display());
}

fn run(cli: Cli) -> mdsnap::Result<()> {
    let request = match cli.command {
        Commands::Pdf { common, paper, landscape, margin, no_background } => {
            let pdf = PdfOptions { format: paper.into(), landscape, margin_in: margin, print_background: !no_background };
            common.into_request(OutputFormat::Pdf, pdf, None, false)
        }
        Commands::Snap { common, clip, full_page } => {
            common.into_request(OutputFormat::Png, PdfOptions::default(), clip, full_page)
        }
        Commands::Presets => {
            for p in viewport::PRESETS.iter() {
                let marker = if p.name == viewport::DEFAULT_PRESET { " (default)" } else { "" };
                println!("{:<10} {:>4}x{:<4}  {}{}", p.name, p.width, p.height, p.description, marker);
            }
            return Ok(());
        }
        Commands::Styles { templates_dir } => {
            for style in TemplateRegistry::new(templates_dir).styles() {
                println!("{}", style);
            }
            return Ok(());
        }
    };

    debug!("Converting to {} with style '{}'", request.format, request.style);
    let result = convert::convert(&CdpLauncher, &request)?;
    report(&result);
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
