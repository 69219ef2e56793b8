//! Content normalisation: Markdown, HTML or plain text in, one HTML fragment out

use crate::InputFormat;
use base64::Engine as Base64Engine;
use comrak::{markdown_to_html as comrak_to_html, Options};
use log::{debug, warn};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Marker paragraph replaced by the table of contents
pub const TOC_MARKER: &str = "[[toc]]";

/// Knobs for [`normalize`]
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Keep `<script>` elements in the output
    pub scripts_allowed: bool,
    /// Replace `[[toc]]` paragraphs with a table of contents (Markdown only)
    pub toc: bool,
    /// Directory relative image paths are resolved against for inlining
    pub base_dir: Option<PathBuf>,
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<h([1-6])>(.*?)</h[1-6]>").expect("static regex"))
}

fn h1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn script_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("static regex"))
}

fn script_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)</?script\b[^>]*>").expect("static regex"))
}

fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(<img\b[^>]*?\bsrc=")([^"]+)(")"#).expect("static regex"))
}

fn blank_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("static regex"))
}

/// Convert `input` of the declared `format` into an HTML fragment.
///
/// HTML input is passed through untouched apart from script stripping and
/// image inlining, so rendering Markdown and then feeding the result back as
/// HTML yields the same body.
pub fn normalize(input: &str, format: InputFormat, options: &NormalizeOptions) -> String {
    let mut html = match format {
        InputFormat::Markdown => markdown_to_html(input, options.toc),
        InputFormat::Html => input.to_string(),
        InputFormat::Text => text_to_html(input),
    };

    if let Some(dir) = &options.base_dir {
        html = inline_local_images(&html, dir);
    }

    if !options.scripts_allowed {
        html = strip_scripts(&html);
    }

    html
}

/// Render Markdown with raw HTML passthrough, autolinks, smart punctuation,
/// footnotes, tables and heading anchors.
pub fn markdown_to_html(markdown: &str, toc: bool) -> String {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;
    options.parse.smart = true;
    options.render.unsafe_ = true;

    let rendered = comrak_to_html(markdown, &options);
    let (html, headings) = add_heading_anchors(&rendered);

    if toc {
        let marker = format!("<p>{}</p>", TOC_MARKER);
        if html.contains(&marker) {
            return html.replace(&marker, &build_toc(&headings));
        }
    }
    html
}

/// Plain text to paragraphs: blank lines separate paragraphs, single newlines
/// become spaces.
pub fn text_to_html(text: &str) -> String {
    blank_line_re()
        .split(text)
        .map(|para| {
            para.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|para| !para.is_empty())
        .map(|para| format!("<p>{}</p>", escape_html(&para)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `<script>` blocks, then any stray opening or closing script tags.
/// Repeats until nothing changes, so fragments that reassemble into a tag
/// after one removal are caught too.
pub fn strip_scripts(html: &str) -> String {
    let mut current = html.to_string();
    loop {
        let without_blocks = script_block_re().replace_all(&current, "");
        let next = script_tag_re().replace_all(&without_blocks, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

#[derive(Debug, Clone)]
struct Heading {
    level: u8,
    id: String,
    text: String,
}

fn add_heading_anchors(html: &str) -> (String, Vec<Heading>) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut issued: HashSet<String> = HashSet::new();
    let mut headings = Vec::new();

    let out = heading_re().replace_all(html, |caps: &Captures| {
        let level: u8 = caps[1].parse().unwrap_or(1);
        let inner = &caps[2];
        let text = plain_text(inner);
        let base = slugify(&text);

        let count = seen.entry(base.clone()).or_insert(0);
        let mut id = base.clone();
        while issued.contains(&id) {
            *count += 1;
            id = format!("{}-{}", base, count);
        }
        issued.insert(id.clone());

        headings.push(Heading { level, id: id.clone(), text });
        format!("<h{lvl} id=\"{id}\">{inner}</h{lvl}>", lvl = level, id = id, inner = inner)
    });

    (out.into_owned(), headings)
}

fn build_toc(headings: &[Heading]) -> String {
    let mut out = String::from("<nav class=\"table-of-contents\">");
    let mut open: Vec<u8> = Vec::new();

    for h in headings {
        while open.last().is_some_and(|&top| top > h.level) {
            out.push_str("</li></ul>");
            open.pop();
        }
        match open.last() {
            Some(&top) if top == h.level => out.push_str("</li><li>"),
            _ => {
                out.push_str("<ul><li>");
                open.push(h.level);
            }
        }
        out.push_str(&format!("<a href=\"#{}\">{}</a>", h.id, escape_html(&h.text)));
    }

    for _ in open {
        out.push_str("</li></ul>");
    }
    out.push_str("</nav>");
    out
}

/// Heading slug: lower-cased, non-word characters other than hyphens and
/// spaces removed, whitespace runs turned into hyphens, then percent-encoded.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let hyphenated = kept.split_whitespace().collect::<Vec<_>>().join("-");
    urlencoding::encode(&hyphenated).into_owned()
}

/// Text content of an HTML fragment with the common entities decoded
pub fn plain_text(html: &str) -> String {
    let stripped = tag_re().replace_all(html, "");
    stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Text of the first `<h1>`, if it has any
pub fn extract_title(html: &str) -> Option<String> {
    h1_re()
        .captures(html)
        .map(|caps| plain_text(&caps[1]))
        .filter(|t| !t.is_empty())
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Replace relative `<img src>` paths with base64 data URIs read from `base_dir`.
///
/// Pages loaded from a string have no file base URL, so relative images would
/// otherwise never load. Absolute URLs, data URIs and unreadable files are left alone.
pub fn inline_local_images(html: &str, base_dir: &Path) -> String {
    img_src_re()
        .replace_all(html, |caps: &Captures| {
            let src = &caps[2];
            let original = format!("{}{}{}", &caps[1], src, &caps[3]);
            if src.contains(':') || src.starts_with("//") || src.starts_with('#') {
                return original;
            }

            let path = base_dir.join(src);
            let Some(mime) = image_mime(&path) else {
                return original;
            };
            match std::fs::read(&path) {
                Ok(bytes) => {
                    debug!("Inlined image {}", path.display());
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    format!("{}data:{};base64,{}{}", &caps[1], mime, encoded, &caps[3])
                }
                Err(e) => {
                    warn!("Could not inline image {}: {}", path.display(), e);
                    original
                }
            }
        })
        .into_owned()
}
