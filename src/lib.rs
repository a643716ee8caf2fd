//! vcf-tiler - Multi-resolution tiles over tabix-indexed cohort VCFs
//!
//! Serves variant records of a bgzipped, tabix-indexed VCF as fixed-width
//! tiles on a concatenated genome axis, for a HiGlass-style genome browser.
//!
//! # Features
//!
//! - Byte-range reads from local files (memory-mapped) or HTTP(S)
//! - Own BGZF and tabix readers, plus an indexer for plain or bgzipped VCF
//! - INFO decoding driven by a JSON field schema, with derived fields
//! - LRU tile cache, filter clauses and top-N limits over cached tiles
//! - A dedicated worker thread reachable from any runtime
//!
//! # Example
//!
//! ```ignore
//! use vcf_tiler::{DatasetSpec, EngineConfig, TileWorker};
//!
//! let worker = TileWorker::spawn(EngineConfig::default())?;
//! let handle = worker.handle();
//!
//! handle
//!     .init("cohort", DatasetSpec::new("https://host/cohort.vcf.gz", "https://host/hg38.chrom.sizes"))
//!     .await?;
//! let tiles = handle.fetch_tiles("cohort", vec!["3.5".into()]).await?;
//! ```

pub mod core;
pub mod engine;
pub mod formats;

// Re-export commonly used types
pub use crate::core::{
    ChromInfo, EngineError, Result, SourceError, TileAddress, TilesetInfo, VcfTilerError,
};
pub use engine::{
    DatasetOptions, DatasetSpec, EngineConfig, FilterClause, SegmentSet, Tile, TileEngine,
    TileWorker, TileWorkerHandle,
};
pub use formats::{VariantRecord, VcfRecord};
