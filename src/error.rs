//! Error types for the conversion pipeline

use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a document
///
/// Every variant is terminal for the request that produced it; nothing in the
/// pipeline retries.
#[derive(Error, Debug)]
pub enum Error {
    /// No path, inline content or URL was supplied
    #[error("No input provided: pass a file path, inline content or a URL")]
    MissingInput,

    /// Safe mode refuses remote URLs as input
    #[error("Safe mode rejects remote input: {url}")]
    UnsafeInputRejected { url: String },

    /// An explicit dimension or the scale factor is outside its bounds
    #[error("{field} must be between {min} and {max} (got {value})")]
    DimensionOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Only one of width/height was supplied
    #[error("Both width and height are required (only {provided} was given)")]
    IncompleteDimensionPair { provided: &'static str },

    /// `waitUntil` value not in load|domcontentloaded|networkidle
    #[error("Invalid wait policy '{0}': expected load, domcontentloaded or networkidle")]
    InvalidWaitPolicy(String),

    /// Page did not settle within the navigation timeout
    #[error("Navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    /// PDF output requires an element matching the given selector
    #[error("Required element '{0}' not found in the rendered page")]
    ContainerNotFound(String),

    /// The requested style has no template
    #[error("Template not found for style '{0}'")]
    TemplateNotFound(String),

    /// The browser engine could not be started
    #[error("Render engine unavailable: {reason}. {hint}")]
    RenderEngineUnavailable { reason: String, hint: String },

    /// `--clip` was not four numeric components
    #[error("Malformed clip '{0}': expected x,y,width,height with positive width and height")]
    MalformedClipSpec(String),

    /// Invalid option that is not covered by a more specific variant
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Failure reported by the browser backend
    #[error("Engine error: {0}")]
    Engine(String),

    /// Filesystem failure while reading input or writing outputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata sidecar serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Engine(err.to_string())
    }
}
