//! Capture-target selection
//!
//! PNG output degrades gracefully (clip, full page, `.card`, `.container`,
//! then full page). PDF output insists on `#container`.

use crate::{CaptureRegion, ClipRect, Engine, Error, OutputFormat, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const CARD_SELECTOR: &str = ".card";
pub const CONTAINER_SELECTOR: &str = ".container";
/// Element PDF output requires
pub const PDF_CONTAINER_SELECTOR: &str = "#container";

/// Which region ended up in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    Clip,
    FullPage,
    Card,
    Container,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CaptureMode::Clip => "clip",
            CaptureMode::FullPage => "fullPage",
            CaptureMode::Card => "card",
            CaptureMode::Container => "container",
        };
        f.write_str(s)
    }
}

/// How strictly the capture target is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePolicy {
    /// Fall back through card, container and full page
    Lenient,
    /// Require [`PDF_CONTAINER_SELECTOR`]; its absence is an error
    Strict,
}

impl CapturePolicy {
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Png => CapturePolicy::Lenient,
            OutputFormat::Pdf => CapturePolicy::Strict,
        }
    }
}

/// Chosen region plus the mode recorded in metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureTarget {
    pub mode: CaptureMode,
    pub region: CaptureRegion,
}

/// Pick the capture target on a loaded page.
pub fn select_target<E: Engine>(
    engine: &mut E,
    policy: CapturePolicy,
    clip: Option<ClipRect>,
    full_page: bool,
) -> Result<CaptureTarget> {
    if policy == CapturePolicy::Strict {
        return match engine.element_rect(PDF_CONTAINER_SELECTOR)? {
            Some(rect) => Ok(CaptureTarget { mode: CaptureMode::Container, region: CaptureRegion::Clip(rect) }),
            None => Err(Error::ContainerNotFound(PDF_CONTAINER_SELECTOR.to_string())),
        };
    }

    if let Some(rect) = clip {
        return Ok(CaptureTarget { mode: CaptureMode::Clip, region: CaptureRegion::Clip(rect) });
    }
    if full_page {
        return Ok(CaptureTarget { mode: CaptureMode::FullPage, region: CaptureRegion::FullPage });
    }

    for (selector, mode) in [(CARD_SELECTOR, CaptureMode::Card), (CONTAINER_SELECTOR, CaptureMode::Container)] {
        if let Some(rect) = engine.element_rect(selector)? {
            debug!("Capturing {} at {:?}", selector, rect);
            return Ok(CaptureTarget { mode, region: CaptureRegion::Clip(rect) });
        }
    }

    warn!("No {} or {} element found; capturing the full page", CARD_SELECTOR, CONTAINER_SELECTOR);
    Ok(CaptureTarget { mode: CaptureMode::FullPage, region: CaptureRegion::FullPage })
}
