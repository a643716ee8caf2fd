//! Tile engine
//!
//! Dataset options, record filters, the LRU tile cache, the engine that
//! ties them to the tabix sources, and the worker thread that hosts it.

pub mod cache;
pub mod coordinator;
pub mod filter;
pub mod options;
pub mod worker;

pub use cache::{Tile, TileCache, TileKey};
pub use coordinator::{DatasetSpec, SegmentSet, TileEngine};
pub use filter::{apply_limit, Filter, Predicate};
pub use options::{
    DatasetOptions, DerivedField, EngineConfig, FilterClause, FilterOperator, InfoField, LimitSpec,
    Transform, MAX_TILES,
};
pub use worker::{TileWorker, TileWorkerHandle, WorkerRequest};
