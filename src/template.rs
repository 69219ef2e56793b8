//! Theme templates: embedded styles plus an optional user template directory

use crate::{Error, Result};
use log::{debug, warn};
use regex::{Captures, Regex};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Style used when the caller does not name one
pub const DEFAULT_STYLE: &str = "default";

const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.html");
const GITHUB_TEMPLATE: &str = include_str!("../templates/github.html");
const DARK_TEMPLATE: &str = include_str!("../templates/dark.html");
const CARD_TEMPLATE: &str = include_str!("../templates/card.html");

/// Names of the templates compiled into the binary
pub const EMBEDDED_STYLES: [&str; 4] = ["default", "github", "dark", "card"];

/// Get an embedded template by style name
pub fn embedded_template(name: &str) -> Option<&'static str> {
    match name {
        "default" => Some(DEFAULT_TEMPLATE),
        "github" => Some(GITHUB_TEMPLATE),
        "dark" => Some(DARK_TEMPLATE),
        "card" => Some(CARD_TEMPLATE),
        _ => None,
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(title|body|styles)\s*\}\}").expect("static regex"))
}

fn close_head_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</head\s*>").expect("static regex"))
}

/// Style names become file names, so only `[A-Za-z0-9_-]` is accepted.
fn valid_style_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolves style names to template source
///
/// A template in the user directory (`<dir>/<style>.html`) shadows the
/// embedded template of the same name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    dir: Option<PathBuf>,
}

impl TemplateRegistry {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Load the template for `style`.
    pub fn load(&self, style: &str) -> Result<String> {
        if !valid_style_name(style) {
            return Err(Error::TemplateNotFound(style.to_string()));
        }

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.html", style));
            if path.is_file() {
                debug!("Using template {}", path.display());
                return Ok(std::fs::read_to_string(&path)?);
            }
        }

        embedded_template(style)
            .map(str::to_string)
            .ok_or_else(|| Error::TemplateNotFound(style.to_string()))
    }

    /// All style names this registry can resolve, sorted
    pub fn styles(&self) -> Vec<String> {
        let mut names: Vec<String> = EMBEDDED_STYLES.iter().map(|s| s.to_string()).collect();
        if let Some(dir) = &self.dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("html") {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        if valid_style_name(stem) {
                            names.push(stem.to_string());
                        }
                    }
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }

    /// Load `style` and fill it in. See [`render`].
    pub fn render(&self, style: &str, title: &str, body: &str, custom_css: Option<&str>) -> Result<String> {
        let template = self.load(style)?;
        Ok(render(&template, title, body, custom_css))
    }
}

/// Substitute `{{title}}` (escaped), `{{body}}` and `{{styles}}` in one pass.
///
/// When the template has no styles placeholder, custom CSS goes into a
/// `<style>` element just before `</head>`.
pub fn render(template: &str, title: &str, body: &str, custom_css: Option<&str>) -> String {
    let escaped_title = crate::content::escape_html(title);
    let has_styles_slot = placeholder_re()
        .captures_iter(template)
        .any(|caps| &caps[1] == "styles");

    let filled = placeholder_re()
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "title" => escaped_title.clone(),
            "body" => body.to_string(),
            _ => custom_css.unwrap_or_default().to_string(),
        })
        .into_owned();

    match custom_css {
        Some(css) if !has_styles_slot && !css.trim().is_empty() => {
            inject_before_head_close(&filled, css)
        }
        _ => filled,
    }
}

fn inject_before_head_close(html: &str, css: &str) -> String {
    match close_head_re().find(html) {
        Some(m) => {
            let mut out = String::with_capacity(html.len() + css.len() + 16);
            out.push_str(&html[..m.start()]);
            out.push_str("<style>");
            out.push_str(css);
            out.push_str("</style>\n");
            out.push_str(&html[m.start()..]);
            out
        }
        None => {
            warn!("Template has no </head>; custom CSS was not injected");
            html.to_string()
        }
    }
}
