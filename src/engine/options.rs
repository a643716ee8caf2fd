//! Engine configuration and per-dataset options
//!
//! Dataset options arrive as JSON (camelCase keys). Keys the engine does
//! not interpret, such as display-only filters, are kept in `extra` and
//! passed back untouched.

use crate::core::error::OptionsError;
use crate::core::tileset::TILE_SIZE;
use crate::engine::filter::Filter;
use crate::formats::decode::{FieldType, RESERVED_FIELD_NAMES};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Default number of tiles kept in the cache
pub const MAX_TILES: usize = 20;

/// Engine-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Bins per tile, used to derive the maximum zoom level
    pub tile_size: u64,
    /// Tile cache capacity
    pub max_tiles: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            max_tiles: MAX_TILES,
        }
    }
}

/// An INFO field to decode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: FieldType,
}

/// A field computed from other INFO fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedField {
    pub name: String,
    #[serde(flatten)]
    pub transform: Transform,
}

/// Derived field formulas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum Transform {
    /// `case - control`; a missing control counts as 0
    DeltaAf { case: String, control: String },
    /// `|case - control|`
    AbsDeltaAf { case: String, control: String },
    /// `-log10(v)` for `v > 0`, else 0
    NegLog10 { source: String },
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    IsOneOf,
    HasOneOf,
    IsBetween,
    IsEqual,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::IsOneOf => "is_one_of",
            FilterOperator::HasOneOf => "has_one_of",
            FilterOperator::IsBetween => "is_between",
            FilterOperator::IsEqual => "is_equal",
        }
    }
}

/// One filter clause as written in the options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: FilterOperator,
    pub target: Value,
}

/// Keep the `max` records with the largest `field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    pub field: String,
    pub max: usize,
}

fn default_multires() -> bool {
    true
}

/// Per-dataset options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOptions {
    #[serde(default)]
    pub info_fields: Vec<InfoField>,
    #[serde(default)]
    pub derived_fields: Vec<DerivedField>,
    #[serde(default)]
    pub filter: Vec<FilterClause>,
    /// Fetch from per-zoom `<chrom>_<level>` contigs
    #[serde(default = "default_multires")]
    pub multires: bool,
    #[serde(default)]
    pub limit: Option<LimitSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            info_fields: Vec::new(),
            derived_fields: Vec::new(),
            filter: Vec::new(),
            multires: true,
            limit: None,
            extra: Map::new(),
        }
    }
}

impl DatasetOptions {
    /// Parse and validate an options document
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: DatasetOptions = serde_json::from_str(json)?;
        options.compiled_filter()?;
        Ok(options)
    }

    /// Parse and validate an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, OptionsError> {
        let options: DatasetOptions = serde_json::from_value(value)?;
        options.compiled_filter()?;
        Ok(options)
    }

    /// Read options from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check field names, then compile the `filter` clauses
    pub fn compiled_filter(&self) -> Result<Filter, OptionsError> {
        let names = self
            .info_fields
            .iter()
            .map(|f| &f.name)
            .chain(self.derived_fields.iter().map(|f| &f.name));
        for name in names {
            if RESERVED_FIELD_NAMES.contains(&name.as_str()) {
                return Err(OptionsError::ReservedField(name.clone()));
            }
        }
        Filter::compile(&self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = DatasetOptions::from_json("{}").unwrap();
        assert!(options.multires);
        assert!(options.info_fields.is_empty());
        assert!(options.limit.is_none());
        assert_eq!(options, DatasetOptions::default());

        let config: EngineConfig = serde_json::from_str(r#"{"maxTiles": 5}"#).unwrap();
        assert_eq!(config.max_tiles, 5);
        assert_eq!(config.tile_size, 1024);
    }

    #[test]
    fn test_full_document() {
        let options = DatasetOptions::from_json(
            r#"{
                "infoFields": [{"name": "AF", "type": "float"}, {"name": "GENE"}],
                "derivedFields": [
                    {"name": "d", "transform": "delta_af", "case": "AF", "control": "AF_ctrl"},
                    {"name": "p", "transform": "neg_log10", "source": "P"}
                ],
                "filter": [{"field": "category", "operator": "is_one_of", "target": ["SNV"]}],
                "multires": false,
                "limit": {"field": "AF", "max": 500},
                "colorScale": [[1, 0, 0, 1]],
                "showFilteredOut": true
            }"#,
        )
        .unwrap();

        assert_eq!(options.info_fields[0].ty, FieldType::Float);
        assert_eq!(options.info_fields[1].ty, FieldType::String);
        assert_eq!(
            options.derived_fields[0].transform,
            Transform::DeltaAf { case: "AF".into(), control: "AF_ctrl".into() }
        );
        assert_eq!(
            options.derived_fields[1].transform,
            Transform::NegLog10 { source: "P".into() }
        );
        assert_eq!(options.filter[0].operator, FilterOperator::IsOneOf);
        assert!(!options.multires);
        assert_eq!(options.limit, Some(LimitSpec { field: "AF".into(), max: 500 }));
        assert_eq!(options.extra["showFilteredOut"], json!(true));
        assert!(options.extra.contains_key("colorScale"));
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            DatasetOptions::from_json("not json"),
            Err(OptionsError::Json(_))
        ));
        assert!(matches!(
            DatasetOptions::from_json(r#"{"filter": [{"field": "x", "operator": "is_like", "target": 1}]}"#),
            Err(OptionsError::Json(_))
        ));
        assert!(matches!(
            DatasetOptions::from_json(r#"{"filter": [{"field": "x", "operator": "is_between", "target": [1]}]}"#),
            Err(OptionsError::InvalidTarget { operator: "is_between", .. })
        ));
    }

    #[test]
    fn test_reserved_field_names() {
        assert!(matches!(
            DatasetOptions::from_json(r#"{"infoFields": [{"name": "to"}]}"#),
            Err(OptionsError::ReservedField(name)) if name == "to"
        ));
        assert!(matches!(
            DatasetOptions::from_json(
                r#"{"derivedFields": [{"name": "alt", "transform": "neg_log10", "source": "P"}]}"#
            ),
            Err(OptionsError::ReservedField(_))
        ));

        // options built in code are checked when compiled
        let mut options = DatasetOptions::default();
        options.info_fields.push(InfoField {
            name: "category".into(),
            ty: FieldType::String,
        });
        assert!(options.compiled_filter().is_err());
    }

    #[test]
    fn test_from_value() {
        let options = DatasetOptions::from_value(json!({"multires": false})).unwrap();
        assert!(!options.multires);
    }
}
