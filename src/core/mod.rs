//! Core coordinate and I/O layer
//!
//! This module contains the chromosome coordinate index, tile geometry,
//! byte sources (local, memory-mapped, HTTP range) and the shared error
//! types.

pub mod chrom;
pub mod error;
pub mod io;
pub mod tileset;

pub use chrom::{ChromEntry, ChromInfo, ChromPosition, ChromWindow};
pub use error::{
    CoordinateError, CoordinateResult, EngineError, OptionsError, Result, SourceError,
    SourceResult, VcfTilerError,
};
pub use io::{ByteSource, CompressionFormat, DEFAULT_BUFFER_SIZE};
pub use tileset::{TileAddress, TilesetInfo, TILE_SIZE};
