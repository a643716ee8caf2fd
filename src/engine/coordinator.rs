//! Tile engine
//!
//! `TileEngine` owns every registry the engine needs: dataset
//! registrations, opened sources, loaded chromosome sizes, tileset
//! descriptors and the tile cache. It is single-threaded (`RefCell`
//! state); `engine::worker` runs it on a dedicated thread.
//!
//! No `RefCell` borrow is held across an await. Two requests missing the
//! same tile may both fetch it; the second store replaces the first. A
//! fetch that outlives a re-`init` of its dataset returns its result but
//! does not store it.

use crate::core::chrom::ChromInfo;
use crate::core::error::{EngineError, Result, VcfTilerError};
use crate::core::tileset::{TileAddress, TilesetInfo};
use crate::engine::cache::{Tile, TileCache, TileKey};
use crate::engine::filter::{apply_limit, Filter};
use crate::engine::options::{DatasetOptions, EngineConfig, FilterClause};
use crate::formats::decode::{VariantDecoder, VariantRecord};
use crate::formats::tabix::TabixVcfSource;
use crate::formats::vcf::VcfRecord;
use futures::future::try_join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Locations and options of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    /// BGZF-compressed VCF, URL or local path
    pub vcf_url: String,
    /// Tabix index; defaults to `<vcf_url>.tbi`
    #[serde(default)]
    pub tbi_url: Option<String>,
    /// Two-column chromosome sizes file
    pub chrom_sizes_url: String,
    #[serde(default)]
    pub options: DatasetOptions,
}

impl DatasetSpec {
    pub fn new(vcf_url: impl Into<String>, chrom_sizes_url: impl Into<String>) -> Self {
        Self {
            vcf_url: vcf_url.into(),
            tbi_url: None,
            chrom_sizes_url: chrom_sizes_url.into(),
            options: DatasetOptions::default(),
        }
    }

    pub fn with_index(mut self, tbi_url: impl Into<String>) -> Self {
        self.tbi_url = Some(tbi_url.into());
        self
    }

    pub fn with_options(mut self, options: DatasetOptions) -> Self {
        self.options = options;
        self
    }
}

/// Aggregated, filtered records of a set of cached tiles
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSet {
    /// Sorted by `(from, id)`
    pub variants: Vec<Arc<VariantRecord>>,
    pub x_scale_domain: Vec<f64>,
    pub x_scale_range: Vec<f64>,
}

/// A registered dataset
struct Dataset {
    spec: DatasetSpec,
    source: Rc<TabixVcfSource>,
    chrom_info: Rc<OnceCell<Arc<ChromInfo>>>,
    filter: Filter,
}

type SourceKey = (String, Option<String>);

/// Tile fetch, cache and aggregation for any number of datasets
pub struct TileEngine {
    config: EngineConfig,
    client: reqwest::Client,
    datasets: RefCell<HashMap<String, Rc<Dataset>>>,
    sources: RefCell<HashMap<SourceKey, Rc<TabixVcfSource>>>,
    chrom_infos: RefCell<HashMap<String, Rc<OnceCell<Arc<ChromInfo>>>>>,
    tilesets: RefCell<HashMap<String, TilesetInfo>>,
    cache: RefCell<TileCache>,
}

impl TileEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client (proxies, timeouts)
    pub fn with_client(config: EngineConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            datasets: RefCell::new(HashMap::new()),
            sources: RefCell::new(HashMap::new()),
            chrom_infos: RefCell::new(HashMap::new()),
            tilesets: RefCell::new(HashMap::new()),
            cache: RefCell::new(TileCache::new(config.max_tiles)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register or re-register a dataset
    ///
    /// Sources and chromosome sizes are shared between datasets that name
    /// the same locations. Re-registering replaces the options and drops
    /// the dataset's tileset descriptor and cached tiles.
    pub fn init(&self, dataset: &str, spec: DatasetSpec) -> Result<()> {
        let filter = spec.options.compiled_filter()?;

        let source_key = (spec.vcf_url.clone(), spec.tbi_url.clone());
        let existing = self.sources.borrow().get(&source_key).cloned();
        let source = match existing {
            Some(source) => source,
            None => {
                let source = Rc::new(TabixVcfSource::open(
                    &spec.vcf_url,
                    spec.tbi_url.as_deref(),
                    &self.client,
                )?);
                self.sources.borrow_mut().insert(source_key, source.clone());
                source
            }
        };

        let chrom_info = self
            .chrom_infos
            .borrow_mut()
            .entry(spec.chrom_sizes_url.clone())
            .or_default()
            .clone();

        info!(
            "initialized dataset {} ({}, {} info fields, {} filter clauses)",
            dataset,
            spec.vcf_url,
            spec.options.info_fields.len(),
            spec.options.filter.len()
        );

        self.datasets.borrow_mut().insert(
            dataset.to_string(),
            Rc::new(Dataset {
                spec,
                source,
                chrom_info,
                filter,
            }),
        );
        self.tilesets.borrow_mut().remove(dataset);
        self.cache.borrow_mut().invalidate_dataset(dataset);
        Ok(())
    }

    pub fn is_initialized(&self, dataset: &str) -> bool {
        self.datasets.borrow().contains_key(dataset)
    }

    /// Options the dataset was registered with
    pub fn options(&self, dataset: &str) -> Result<DatasetOptions> {
        Ok(self.dataset(dataset)?.spec.options.clone())
    }

    fn dataset(&self, dataset: &str) -> Result<Rc<Dataset>> {
        self.datasets
            .borrow()
            .get(dataset)
            .cloned()
            .ok_or_else(|| EngineError::DatasetNotInitialized(dataset.to_string()).into())
    }

    /// Whether `entry` is still the registration of `dataset`
    fn is_current(&self, dataset: &str, entry: &Rc<Dataset>) -> bool {
        self.datasets
            .borrow()
            .get(dataset)
            .is_some_and(|current| Rc::ptr_eq(current, entry))
    }

    async fn chrom_info(&self, dataset: &Dataset) -> Result<Arc<ChromInfo>> {
        let location = dataset.spec.chrom_sizes_url.as_str();
        dataset
            .chrom_info
            .get_or_try_init(|| async {
                debug!("loading chromosome sizes {}", location);
                Ok::<_, VcfTilerError>(Arc::new(ChromInfo::load(location, &self.client).await?))
            })
            .await
            .cloned()
    }

    /// Tileset descriptor, computed once the header and sizes are loaded
    pub async fn tileset_info(&self, dataset: &str) -> Result<TilesetInfo> {
        let entry = self.dataset(dataset)?;
        if let Some(info) = self.tilesets.borrow().get(dataset) {
            return Ok(info.clone());
        }

        entry.source.header().await?;
        let chrom_info = self.chrom_info(&entry).await?;
        let info = TilesetInfo::compute(&chrom_info, self.config.tile_size);
        debug!(
            "tileset {}: {} bp, max zoom {}",
            dataset, info.max_width, info.max_zoom
        );

        if self.is_current(dataset, &entry) {
            self.tilesets
                .borrow_mut()
                .insert(dataset.to_string(), info.clone());
        }
        Ok(info)
    }

    /// One tile, from the cache or freshly fetched and decoded
    pub async fn tile(&self, dataset: &str, zoom: u32, index: u64) -> Result<Tile> {
        let key = TileKey::new(dataset, zoom, index);
        if let Some(tile) = self.cache.borrow_mut().get(&key) {
            return Ok(tile);
        }

        let entry = self.dataset(dataset)?;
        let tileset = self.tileset_info(dataset).await?;
        let address = TileAddress::new(zoom, index);
        tileset.validate(address)?;

        let chrom_info = self.chrom_info(&entry).await?;
        let header = entry.source.header().await?;
        let decoder = VariantDecoder::new(&header, &entry.spec.options);

        let (min_x, max_x) = tileset.tile_bounds(address);
        let mut records = Vec::new();
        for window in chrom_info.split_range(min_x, max_x) {
            let contig = if entry.spec.options.multires {
                tileset.multires_chrom_name(&window.chrom, zoom)
            } else {
                window.chrom.clone()
            };
            debug!(
                "tile {}: {}:{}-{} from {}",
                key, window.chrom, window.start, window.end, contig
            );

            entry
                .source
                .query_lines(&contig, window.start, window.end, |line| -> Result<()> {
                    let decoded =
                        decoder.decode_line(line, &window.chrom, &contig, window.chrom_offset)?;
                    records.extend(decoded.into_iter().map(Arc::new));
                    Ok(())
                })
                .await?;
        }

        let tile: Tile = Arc::new(records);
        if self.is_current(dataset, &entry) {
            self.cache.borrow_mut().put(key, tile.clone());
        } else {
            debug!("tile {} outlived a re-init of {}, not cached", key, dataset);
        }
        Ok(tile)
    }

    /// Fetch several tiles concurrently; any failure fails the batch
    pub async fn fetch_many(&self, dataset: &str, addresses: &[TileAddress]) -> Result<Vec<Tile>> {
        try_join_all(
            addresses
                .iter()
                .map(|address| self.tile(dataset, address.zoom, address.index)),
        )
        .await
    }

    /// Fetch tiles by `"<zoom>.<index>"` id
    ///
    /// Malformed ids are skipped with a warning; repeated ids are fetched
    /// once.
    pub async fn fetch_tiles_debounced(
        &self,
        dataset: &str,
        tile_ids: &[String],
    ) -> Result<BTreeMap<String, Tile>> {
        self.dataset(dataset)?;

        let mut wanted = BTreeMap::new();
        for tile_id in tile_ids {
            match TileAddress::parse(tile_id) {
                Some(address) => {
                    wanted.insert(tile_id.clone(), address);
                }
                None => warn!("skipping invalid tile id '{}' for {}", tile_id, dataset),
            }
        }

        let addresses: Vec<TileAddress> = wanted.values().copied().collect();
        let tiles = self.fetch_many(dataset, &addresses).await?;
        Ok(wanted.into_keys().zip(tiles).collect())
    }

    /// Merge, filter and order the records of already cached tiles
    ///
    /// Ids that are malformed or not cached contribute nothing. `filter`
    /// replaces the dataset's own clauses when given.
    pub fn retrieve_segments(
        &self,
        dataset: &str,
        tile_ids: &[String],
        x_scale_domain: Vec<f64>,
        x_scale_range: Vec<f64>,
        filter: Option<&[FilterClause]>,
    ) -> Result<SegmentSet> {
        let entry = self.dataset(dataset)?;
        let filter = match filter {
            Some(clauses) => Filter::compile(clauses)?,
            None => entry.filter.clone(),
        };

        let keys: BTreeSet<TileKey> = tile_ids
            .iter()
            .filter_map(|tile_id| {
                let address = TileAddress::parse(tile_id);
                if address.is_none() {
                    warn!("skipping invalid tile id '{}' for {}", tile_id, dataset);
                }
                address
            })
            .map(|address| TileKey::new(dataset, address.zoom, address.index))
            .collect();

        // first occurrence in key order wins
        let mut merged: BTreeMap<String, Arc<VariantRecord>> = BTreeMap::new();
        {
            let mut cache = self.cache.borrow_mut();
            for key in &keys {
                let Some(tile) = cache.get(key) else {
                    continue;
                };
                for record in tile.iter() {
                    merged
                        .entry(record.id.clone())
                        .or_insert_with(|| record.clone());
                }
            }
        }

        let mut variants = filter.apply(merged.into_values().collect());
        if let Some(limit) = &entry.spec.options.limit {
            variants = apply_limit(variants, limit);
        }
        variants.sort_by(|a, b| (a.from, &a.id).cmp(&(b.from, &b.id)));

        Ok(SegmentSet {
            variants,
            x_scale_domain,
            x_scale_range,
        })
    }

    /// Full VCF records at a 1-based chromosome position
    pub async fn variant_details(
        &self,
        dataset: &str,
        chrom: &str,
        pos: u64,
    ) -> Result<Vec<VcfRecord>> {
        let entry = self.dataset(dataset)?;
        let header = entry.source.header().await?;

        let mut records = Vec::new();
        entry
            .source
            .query_lines(chrom, pos.saturating_sub(1), pos, |line| -> Result<()> {
                records.push(VcfRecord::parse(line, &header)?);
                Ok(())
            })
            .await?;
        Ok(records)
    }

    /// Whether a tile is currently cached, without touching its recency
    pub fn is_cached(&self, dataset: &str, zoom: u32, index: u64) -> bool {
        self.cache
            .borrow()
            .contains(&TileKey::new(dataset, zoom, index))
    }

    pub fn cached_tiles(&self) -> usize {
        self.cache.borrow().len()
    }
}
