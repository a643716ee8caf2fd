//! Tileset descriptor
//!
//! Derives tile geometry (tile size, max zoom, genome extent) from the
//! coordinate index. At zoom `z` the genome is cut into `2^z` tiles of
//! width `max_width / 2^z`.

use crate::core::chrom::ChromInfo;
use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};

/// Default number of bins per tile
pub const TILE_SIZE: u64 = 1024;

/// Deepest zoom for which `2^zoom` is a finite `f64`
pub const MAX_ZOOM_LEVEL: u32 = 1023;

/// A tile at a given zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    pub zoom: u32,
    pub index: u64,
}

impl TileAddress {
    pub fn new(zoom: u32, index: u64) -> Self {
        Self { zoom, index }
    }

    /// Parse the `"<zoom>.<index>"` tile id wire format
    ///
    /// # Examples
    /// ```
    /// use vcf_tiler::core::TileAddress;
    ///
    /// assert_eq!(TileAddress::parse("3.5"), Some(TileAddress::new(3, 5)));
    /// assert_eq!(TileAddress::parse("3.x"), None);
    /// assert_eq!(TileAddress::parse("3"), None);
    /// ```
    pub fn parse(tile_id: &str) -> Option<Self> {
        let (zoom, index) = tile_id.split_once('.')?;
        let zoom: u32 = zoom.trim().parse().ok()?;
        if zoom > MAX_ZOOM_LEVEL {
            return None;
        }
        Some(Self {
            zoom,
            index: index.trim().parse().ok()?,
        })
    }

    /// Render the `"<zoom>.<index>"` wire format
    pub fn tile_id(&self) -> String {
        format!("{}.{}", self.zoom, self.index)
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.zoom, self.index)
    }
}

/// Per-dataset tile geometry, serialized in the layout the host track expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetInfo {
    pub tile_size: u64,
    pub bins_per_dimension: u64,
    pub max_zoom: u32,
    pub max_width: u64,
    pub min_pos: [u64; 1],
    pub max_pos: [u64; 1],
}

impl TilesetInfo {
    /// Compute the descriptor for a coordinate index
    ///
    /// `max_zoom = ceil(log2(total_length / tile_size))`, never negative.
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::core::{ChromInfo, TilesetInfo};
    ///
    /// let info = ChromInfo::from_sizes(vec![("chr1", 2000)]).unwrap();
    /// let tileset = TilesetInfo::compute(&info, 1024);
    /// assert_eq!(tileset.max_zoom, 1);
    /// assert_eq!(tileset.max_width, 2000);
    /// ```
    pub fn compute(chrom_info: &ChromInfo, tile_size: u64) -> Self {
        let total = chrom_info.total_length();
        let ratio = total as f64 / tile_size.max(1) as f64;
        let max_zoom = ratio.log2().ceil().max(0.0) as u32;

        Self {
            tile_size,
            bins_per_dimension: tile_size,
            max_zoom,
            max_width: total,
            min_pos: [0],
            max_pos: [total],
        }
    }

    /// Width in bases of one tile at `zoom`
    pub fn tile_width(&self, zoom: u32) -> f64 {
        self.max_width as f64 / 2f64.powi(zoom.min(MAX_ZOOM_LEVEL) as i32)
    }

    /// Absolute `[start, end)` bounds of a tile
    pub fn tile_bounds(&self, tile: TileAddress) -> (f64, f64) {
        let width = self.tile_width(tile.zoom);
        let min_x = self.min_pos[0] as f64 + tile.index as f64 * width;
        (min_x, min_x + width)
    }

    /// Reject tiles that start past the end of the genome
    pub fn validate(&self, tile: TileAddress) -> Result<(), EngineError> {
        let (min_x, _) = self.tile_bounds(tile);
        if min_x > self.max_pos[0] as f64 {
            return Err(EngineError::TileOutOfRange {
                zoom: tile.zoom,
                index: tile.index,
            });
        }
        Ok(())
    }

    /// Name of the pre-aggregated chromosome matching `zoom`
    ///
    /// Zoom levels finer than `max_zoom` clamp to the finest (`_0`) suffix.
    ///
    /// # Example
    /// ```
    /// use vcf_tiler::core::{ChromInfo, TilesetInfo};
    ///
    /// let info = ChromInfo::from_sizes(vec![("chr1", 1 << 20)]).unwrap();
    /// let tileset = TilesetInfo::compute(&info, 1024);
    /// assert_eq!(tileset.max_zoom, 10);
    /// assert_eq!(tileset.multires_chrom_name("chr1", 7), "chr1_3");
    /// assert_eq!(tileset.multires_chrom_name("chr1", 12), "chr1_0");
    /// ```
    pub fn multires_chrom_name(&self, chrom: &str, zoom: u32) -> String {
        format!("{}_{}", chrom, self.max_zoom.saturating_sub(zoom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tileset(total: u64) -> TilesetInfo {
        let info = ChromInfo::from_sizes(vec![("chr1", total)]).unwrap();
        TilesetInfo::compute(&info, TILE_SIZE)
    }

    #[test]
    fn test_compute_two_kilobases() {
        let ts = tileset(2000);
        assert_eq!(ts.max_zoom, 1);
        assert_eq!(ts.max_width, 2000);
        assert_eq!(ts.min_pos, [0]);
        assert_eq!(ts.max_pos, [2000]);
        assert_eq!(ts.tile_size, 1024);
        assert_eq!(ts.bins_per_dimension, 1024);
    }

    #[test]
    fn test_tile_bounds_per_zoom() {
        let ts = tileset(2000);
        assert_eq!(ts.tile_bounds(TileAddress::new(0, 0)), (0.0, 2000.0));
        assert_eq!(ts.tile_bounds(TileAddress::new(1, 0)), (0.0, 1000.0));
        assert_eq!(ts.tile_bounds(TileAddress::new(1, 1)), (1000.0, 2000.0));
    }

    #[test]
    fn test_small_genome_has_zoom_zero() {
        let ts = tileset(100);
        assert_eq!(ts.max_zoom, 0);
        assert_eq!(ts.multires_chrom_name("chr1", 0), "chr1_0");
    }

    #[test]
    fn test_exact_power_of_two() {
        let ts = tileset(1024 * 8);
        assert_eq!(ts.max_zoom, 3);
    }

    #[test]
    fn test_validate() {
        let ts = tileset(2000);
        assert!(ts.validate(TileAddress::new(1, 1)).is_ok());
        // tile starting exactly at the genome end is allowed (empty)
        assert!(ts.validate(TileAddress::new(1, 2)).is_ok());
        assert!(matches!(
            ts.validate(TileAddress::new(1, 3)),
            Err(EngineError::TileOutOfRange { zoom: 1, index: 3 })
        ));
    }

    #[test]
    fn test_extreme_zoom_stays_inside_genome() {
        let ts = tileset(2000);
        let (min_x, max_x) = ts.tile_bounds(TileAddress::new(u32::MAX, 0));
        assert_eq!(min_x, 0.0);
        assert!(max_x > 0.0 && max_x < 1.0);
        assert!(ts.validate(TileAddress::new(u32::MAX, 0)).is_ok());
    }

    #[test]
    fn test_tile_address_parse() {
        assert_eq!(TileAddress::parse("0.0"), Some(TileAddress::new(0, 0)));
        assert_eq!(TileAddress::parse("12.4095"), Some(TileAddress::new(12, 4095)));
        assert_eq!(TileAddress::parse("a.1"), None);
        assert_eq!(TileAddress::parse("1.-1"), None);
        assert_eq!(TileAddress::parse("1.2.3"), None);
        assert_eq!(TileAddress::parse("1023.0"), Some(TileAddress::new(1023, 0)));
        assert_eq!(TileAddress::parse("1024.0"), None);
        assert_eq!(TileAddress::parse("4294967295.0"), None);
        assert_eq!(TileAddress::parse(""), None);
        assert_eq!(TileAddress::new(4, 2).tile_id(), "4.2");
    }

    #[test]
    fn test_serialized_layout() {
        let json = serde_json::to_value(tileset(2000)).unwrap();
        assert_eq!(json["max_zoom"], 1);
        assert_eq!(json["max_pos"][0], 2000);
        assert_eq!(json["min_pos"][0], 0);
    }
}
