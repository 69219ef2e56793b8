//! Metadata sidecar written next to every artifact

use crate::capture::CaptureMode;
use crate::{EngineVersion, OutputFormat, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Engine identity as recorded in the sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

impl From<EngineVersion> for EngineInfo {
    fn from(v: EngineVersion) -> Self {
        Self { name: v.name, version: v.version }
    }
}

/// Contents of `<name>.meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMeta {
    pub engine: EngineInfo,
    /// ISO-8601 UTC timestamp
    pub generated_at: String,
    pub preset: String,
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub style: String,
    pub format: String,
    pub capture_mode: CaptureMode,
    /// Hex SHA-256 of the source content, or of the URL for URL sources
    pub content_hash: String,
}

/// Hex-encoded SHA-256 digest
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// ISO-8601 rendering of `at` with millisecond precision
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Everything needed to build a [`RenderMeta`] except the clock
#[derive(Debug, Clone)]
pub struct MetaInput<'a> {
    pub engine: EngineVersion,
    pub preset: &'a str,
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub style: &'a str,
    pub format: OutputFormat,
    pub capture_mode: CaptureMode,
    pub source: &'a [u8],
}

impl RenderMeta {
    pub fn new(input: MetaInput<'_>, at: DateTime<Utc>) -> Self {
        Self {
            engine: input.engine.into(),
            generated_at: timestamp(at),
            preset: input.preset.to_string(),
            width: input.width,
            height: input.height,
            device_scale_factor: input.device_scale_factor,
            style: input.style.to_string(),
            format: input.format.to_string(),
            capture_mode: input.capture_mode,
            content_hash: content_hash(input.source),
        }
    }

    /// Write as pretty JSON, replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
