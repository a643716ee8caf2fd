//! Error types for vcf-tiler
//!
//! Defines the error types shared by the coordinate, source and engine layers.
//! Format-specific parse errors live next to their parsers
//! (`formats::vcf::VcfParseError`, `formats::decode::DecodeError`).

use crate::formats::decode::DecodeError;
use crate::formats::vcf::VcfParseError;
use thiserror::Error;

/// Main error type for vcf-tiler operations
#[derive(Debug, Error)]
pub enum VcfTilerError {
    /// Chromosome sizes / coordinate errors
    #[error("Coordinate error: {0}")]
    Coordinate(#[from] CoordinateError),

    /// Remote or local byte source, BGZF or tabix index failures
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Structurally malformed VCF line
    #[error("VCF parse error: {0}")]
    Parse(#[from] VcfParseError),

    /// Variant decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid dataset options
    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    /// Engine configuration / lifecycle errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or querying chromosome sizes
#[derive(Debug, Error)]
pub enum CoordinateError {
    /// Malformed chromosome sizes row
    #[error("Invalid chromosome sizes at line {line}: {message}")]
    Format { line: usize, message: String },

    /// Chromosome not present in the coordinate index
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// I/O error while reading the sizes file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by byte sources, the BGZF codec and the tabix index
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure (connection refused, timeout, ...)
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Corrupt or truncated BGZF data
    #[error("Invalid BGZF data: {0}")]
    Bgzf(String),

    /// VCF header that cannot be parsed
    #[error("Invalid VCF header in {location}: {message}")]
    Header { location: String, message: String },

    /// Corrupt tabix index
    #[error("Invalid tabix index: {0}")]
    Index(String),

    /// Non UTF-8 text in header or data lines
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating dataset options
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Options document is not valid JSON for the schema
    #[error("Invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Filter target does not fit the operator
    #[error("Invalid target for {operator} filter on '{field}': {message}")]
    InvalidTarget {
        field: String,
        operator: &'static str,
        message: String,
    },

    /// INFO or derived field named after a record attribute
    #[error("Field name '{0}' is reserved for a record attribute")]
    ReservedField(String),

    /// I/O error while reading an options file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the tile engine itself
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation on a dataset id that was never passed to `init`
    #[error("Dataset not initialized: {0}")]
    DatasetNotInitialized(String),

    /// Tile index lies beyond the genome at this zoom level
    #[error("Tile {zoom}.{index} is outside the genome")]
    TileOutOfRange { zoom: u32, index: u64 },

    /// Worker thread has shut down
    #[error("Tile worker is not running")]
    WorkerUnavailable,
}

/// Result type alias for vcf-tiler operations
pub type Result<T> = std::result::Result<T, VcfTilerError>;

/// Result type alias for coordinate operations
pub type CoordinateResult<T> = std::result::Result<T, CoordinateError>;

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;
