//! Viewport resolution: explicit size, clip rectangle or named preset

use crate::{ClipRect, Error, Result, Viewport};
use log::warn;

/// Smallest accepted explicit width/height
pub const MIN_DIMENSION: u32 = 100;
/// Largest accepted explicit width/height
pub const MAX_DIMENSION: u32 = 5000;
/// Device scale factor bounds (inclusive)
pub const MIN_SCALE: f64 = 1.0;
pub const MAX_SCALE: f64 = 4.0;

/// Preset used when none is named or the name is unknown
pub const DEFAULT_PRESET: &str = "og";

/// A named, fixed viewport size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub description: &'static str,
}

pub const PRESETS: [Preset; 6] = [
    Preset { name: "og", width: 1200, height: 630, description: "Open Graph link preview" },
    Preset { name: "twitter", width: 1200, height: 675, description: "Twitter/X summary card" },
    Preset { name: "linkedin", width: 1200, height: 627, description: "LinkedIn shared post" },
    Preset { name: "square", width: 1080, height: 1080, description: "Square social post" },
    Preset { name: "story", width: 1080, height: 1920, description: "Vertical story" },
    Preset { name: "desktop", width: 1920, height: 1080, description: "Full HD desktop" },
];

/// Look up a preset by exact name
pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

fn default_preset() -> &'static Preset {
    &PRESETS[0]
}

/// Where the final viewport came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportSource {
    Explicit,
    Clip,
    Preset,
}

/// Result of viewport resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedViewport {
    pub viewport: Viewport,
    pub scale: f64,
    /// Preset name recorded in metadata ("custom" for explicit sizes, "clip" for clip-derived ones)
    pub preset: String,
    pub source: ViewportSource,
}

/// Parse a `x,y,width,height` clip string.
pub fn parse_clip(spec: &str) -> Result<ClipRect> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(Error::MalformedClipSpec(spec.to_string()));
    }

    let mut values = [0f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::MalformedClipSpec(spec.to_string()))?;
    }

    let [x, y, width, height] = values;
    if width <= 0.0 || height <= 0.0 {
        return Err(Error::MalformedClipSpec(spec.to_string()));
    }

    Ok(ClipRect { x, y, width, height })
}

fn check_dimension(field: &'static str, value: u32) -> Result<u32> {
    if (MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        Ok(value)
    } else {
        Err(Error::DimensionOutOfRange {
            field,
            value: value as f64,
            min: MIN_DIMENSION as f64,
            max: MAX_DIMENSION as f64,
        })
    }
}

/// Clip sizes may be small, but the window they size is capped at [`MAX_DIMENSION`].
fn clip_dimension(field: &'static str, value: f64) -> Result<u32> {
    let rounded = value.ceil();
    if rounded > MAX_DIMENSION as f64 {
        return Err(Error::DimensionOutOfRange {
            field,
            value: rounded,
            min: MIN_DIMENSION as f64,
            max: MAX_DIMENSION as f64,
        });
    }
    Ok(rounded as u32)
}

/// Validate the device scale factor against `[1, 4]`.
pub fn check_scale(scale: f64) -> Result<f64> {
    if (MIN_SCALE..=MAX_SCALE).contains(&scale) {
        Ok(scale)
    } else {
        Err(Error::DimensionOutOfRange { field: "scale", value: scale, min: MIN_SCALE, max: MAX_SCALE })
    }
}

/// Resolve the viewport. First match wins:
/// explicit width+height, then clip rectangle, then preset (unknown names fall
/// back to [`DEFAULT_PRESET`]).
pub fn resolve(
    preset_name: Option<&str>,
    width: Option<u32>,
    height: Option<u32>,
    scale: f64,
    clip: Option<&ClipRect>,
) -> Result<ResolvedViewport> {
    let scale = check_scale(scale)?;

    match (width, height) {
        (Some(w), Some(h)) => {
            let viewport = Viewport {
                width: check_dimension("width", w)?,
                height: check_dimension("height", h)?,
            };
            return Ok(ResolvedViewport {
                viewport,
                scale,
                preset: "custom".to_string(),
                source: ViewportSource::Explicit,
            });
        }
        (Some(_), None) => return Err(Error::IncompleteDimensionPair { provided: "width" }),
        (None, Some(_)) => return Err(Error::IncompleteDimensionPair { provided: "height" }),
        (None, None) => {}
    }

    if let Some(rect) = clip.filter(|r| r.width > 0.0 && r.height > 0.0) {
        let viewport = Viewport {
            width: clip_dimension("width", rect.width)?,
            height: clip_dimension("height", rect.height)?,
        };
        return Ok(ResolvedViewport {
            viewport,
            scale,
            preset: "clip".to_string(),
            source: ViewportSource::Clip,
        });
    }

    let chosen = match preset_name {
        Some(name) => preset(name).unwrap_or_else(|| {
            warn!("Unknown preset '{}', falling back to '{}'", name, DEFAULT_PRESET);
            default_preset()
        }),
        None => default_preset(),
    };

    Ok(ResolvedViewport {
        viewport: Viewport { width: chosen.width, height: chosen.height },
        scale,
        preset: chosen.name.to_string(),
        source: ViewportSource::Preset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_unique_and_default_exists() {
        let mut names: Vec<_> = PRESETS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PRESETS.len());
        assert!(preset(DEFAULT_PRESET).is_some());
    }

    #[test]
    fn og_preset_is_1200_by_630() {
        let r = resolve(Some("og"), None, None, 1.0, None).unwrap();
        assert_eq!(r.viewport, Viewport { width: 1200, height: 630 });
        assert_eq!(r.preset, "og");
        assert_eq!(r.source, ViewportSource::Preset);
    }

    #[test]
    fn unknown_preset_falls_back_to_default() {
        let r = resolve(Some("poster"), None, None, 1.0, None).unwrap();
        assert_eq!(r.preset, DEFAULT_PRESET);
        assert_eq!(r.viewport.width, 1200);
    }

    #[test]
    fn explicit_dimensions_win_over_clip_and_preset() {
        let clip = ClipRect { x: 0.0, y: 0.0, width: 300.0, height: 300.0 };
        let r = resolve(Some("story"), Some(800), Some(600), 2.0, Some(&clip)).unwrap();
        assert_eq!(r.viewport, Viewport { width: 800, height: 600 });
        assert_eq!(r.scale, 2.0);
        assert_eq!(r.source, ViewportSource::Explicit);
    }

    #[test]
    fn clip_rounds_up_to_whole_pixels() {
        let clip = ClipRect { x: 10.0, y: 10.0, width: 200.2, height: 149.5 };
        let r = resolve(Some("story"), None, None, 1.0, Some(&clip)).unwrap();
        assert_eq!(r.viewport, Viewport { width: 201, height: 150 });
        assert_eq!(r.source, ViewportSource::Clip);
    }

    #[test]
    fn oversized_clip_is_rejected() {
        let clip = parse_clip("0,0,1e12,10").unwrap();
        let err = resolve(None, None, None, 1.0, Some(&clip)).unwrap_err();
        assert!(matches!(err, Error::DimensionOutOfRange { field: "width", .. }), "{}", err);

        let edge = ClipRect { x: 0.0, y: 0.0, width: 4999.5, height: 10.0 };
        assert_eq!(resolve(None, None, None, 1.0, Some(&edge)).unwrap().viewport.width, 5000);
    }

    #[test]
    fn dimension_bounds_are_inclusive() {
        assert!(resolve(None, Some(100), Some(5000), 1.0, None).is_ok());
        for (w, h, field) in [(99, 500, "width"), (500, 5001, "height"), (0, 0, "width")] {
            let err = resolve(None, Some(w), Some(h), 1.0, None).unwrap_err();
            assert!(matches!(err, Error::DimensionOutOfRange { field: f, .. } if f == field), "{}x{}", w, h);
        }
    }

    #[test]
    fn scale_bounds_are_inclusive() {
        assert!(resolve(None, None, None, 1.0, None).is_ok());
        assert!(resolve(None, None, None, 4.0, None).is_ok());
        for bad in [0.5, 4.01, 0.0, f64::NAN] {
            let err = resolve(None, None, None, bad, None).unwrap_err();
            assert!(matches!(err, Error::DimensionOutOfRange { field: "scale", .. }));
        }
    }

    #[test]
    fn half_a_pair_is_rejected() {
        assert!(matches!(
            resolve(None, Some(800), None, 1.0, None),
            Err(Error::IncompleteDimensionPair { provided: "width" })
        ));
        assert!(matches!(
            resolve(None, None, Some(800), 1.0, None),
            Err(Error::IncompleteDimensionPair { provided: "height" })
        ));
    }

    #[test]
    fn parse_clip_accepts_four_numbers() {
        let c = parse_clip("10, 10,200,150").unwrap();
        assert_eq!(c, ClipRect { x: 10.0, y: 10.0, width: 200.0, height: 150.0 });
    }

    #[test]
    fn parse_clip_rejects_malformed_specs() {
        for spec in ["10,10,200", "a,b,c,d", "1,2,3,4,5", "0,0,0,100", "0,0,100,-1", "", "0,0,inf,10"] {
            assert!(matches!(parse_clip(spec), Err(Error::MalformedClipSpec(_))), "{:?}", spec);
        }
    }
}
