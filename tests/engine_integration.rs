//! End-to-end tests for the tile engine
//!
//! Datasets are bgzipped and indexed into a temporary directory, then
//! served through `TileEngine` and the worker thread.

use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use vcf_tiler::engine::{apply_limit, Filter, FilterOperator, LimitSpec};
use vcf_tiler::formats::tabix::compress_and_index_vcf;
use vcf_tiler::formats::{FieldValue, VariantCategory, VariantRecord};
use vcf_tiler::{
    DatasetOptions, DatasetSpec, EngineConfig, EngineError, FilterClause, TileEngine, TileWorker,
    VcfTilerError,
};

const HEADER: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=AF_proband,Number=A,Type=Float,Description=\"Proband AF\">\n\
##INFO=<ID=AF_ref,Number=A,Type=Float,Description=\"Reference AF\">\n\
##INFO=<ID=level,Number=1,Type=String,Description=\"Impact\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"Consequences\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

struct Fixture {
    _dir: TempDir,
    spec: DatasetSpec,
}

fn fixture(body: &str, sizes: &str, options: serde_json::Value) -> Fixture {
    let dir = TempDir::new().unwrap();
    let (vcf, index) = compress_and_index_vcf(format!("{}{}", HEADER, body).as_bytes()).unwrap();
    let vcf_path = dir.path().join("cohort.vcf.gz");
    let sizes_path = dir.path().join("genome.chrom.sizes");
    fs::write(&vcf_path, vcf).unwrap();
    fs::write(dir.path().join("cohort.vcf.gz.tbi"), index.to_bytes().unwrap()).unwrap();
    fs::write(&sizes_path, sizes).unwrap();

    let spec = DatasetSpec::new(
        vcf_path.to_string_lossy().into_owned(),
        sizes_path.to_string_lossy().into_owned(),
    )
    .with_options(DatasetOptions::from_value(options).unwrap());
    Fixture { _dir: dir, spec }
}

fn cohort() -> Fixture {
    fixture(
        "chr1\t500\t.\tC\tA,G\t.\tPASS\tAF_proband=0.1,0.2;AF_ref=0.05,NA;level=HIGH;CSQ=missense|stop_gained\n\
chr1\t700\trs7\tT\tTTA\t.\tPASS\tAF_proband=0.4;AF_ref=0.1;level=LOW;CSQ=intron\n\
chr2\t100\t.\tGAC\tG\t.\tPASS\tAF_proband=0.3;AF_ref=.;level=MODERATE;CSQ=frameshift|missense\n",
        "chr1\t1000\nchr2\t1000\n",
        json!({
            "multires": false,
            "infoFields": [
                {"name": "AF_proband", "type": "float"},
                {"name": "level"},
                {"name": "CSQ", "type": "string_list"}
            ],
            "derivedFields": [
                {"name": "deltaAF", "transform": "delta_af", "case": "AF_proband", "control": "AF_ref"}
            ],
            "colorScale": ["#ff0000"]
        }),
    )
}

fn ids(records: &[Arc<VariantRecord>]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

fn tile_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_tile_contents_on_genome_axis() {
    let fx = cohort();
    let engine = TileEngine::new(EngineConfig::default());
    engine.init("cohort", fx.spec.clone()).unwrap();

    let info = engine.tileset_info("cohort").await.unwrap();
    assert_eq!((info.max_zoom, info.max_width), (1, 2000));

    let tiles = engine
        .fetch_tiles_debounced("cohort", &tile_ids(&["1.0", "1.1"]))
        .await
        .unwrap();
    let left = &tiles["1.0"];
    assert_eq!(ids(left), vec!["chr1:500:C:A", "chr1:500:C:G", "chr1:700:T:TTA"]);
    assert_eq!(left[0].category, VariantCategory::Snv);
    assert_eq!(left[2].category, VariantCategory::Insertion);
    assert_eq!(left[2].vcf_id.as_deref(), Some("rs7"));

    let right = &tiles["1.1"];
    assert_eq!(right.len(), 1);
    assert_eq!(right[0].from, 1100);
    assert_eq!(right[0].to, 1103);
    assert_eq!(right[0].category, VariantCategory::Deletion);
    // a missing control frequency counts as zero
    assert_eq!(right[0].field("deltaAF").as_f64(), Some(0.3));
    assert_eq!(
        right[0].field("CSQ"),
        &FieldValue::List(vec!["frameshift".into(), "missense".into()])
    );
}

#[tokio::test]
async fn test_records_serialize_for_the_track() {
    let fx = cohort();
    let engine = TileEngine::new(EngineConfig::default());
    engine.init("cohort", fx.spec.clone()).unwrap();
    let tile = engine.tile("cohort", 1, 1).await.unwrap();

    let json = serde_json::to_value(&*tile[0]).unwrap();
    assert_eq!(json["chrName"], "chr2");
    assert_eq!(json["chrOffset"], 1000);
    assert_eq!(json["ref"], "GAC");
    assert_eq!(json["category"], "deletion");
    assert_eq!(json["AF_proband"], 0.3);
    assert_eq!(json["level"], "MODERATE");

    let options = engine.options("cohort").unwrap();
    assert_eq!(options.extra["colorScale"], json!(["#ff0000"]));
}

#[tokio::test]
async fn test_segments_with_has_one_of_and_between() {
    let fx = cohort();
    let engine = TileEngine::new(EngineConfig::default());
    engine.init("cohort", fx.spec.clone()).unwrap();
    let ids_wanted = tile_ids(&["1.0", "1.1"]);
    engine.fetch_tiles_debounced("cohort", &ids_wanted).await.unwrap();

    let missense = [FilterClause {
        field: "CSQ".into(),
        operator: FilterOperator::HasOneOf,
        target: json!(["missense"]),
    }];
    let segments = engine
        .retrieve_segments("cohort", &ids_wanted, vec![0.0, 2000.0], vec![0.0, 1.0], Some(&missense))
        .unwrap();
    assert_eq!(
        ids(&segments.variants),
        vec!["chr1:500:C:A", "chr1:500:C:G", "chr2:100:GAC:G"]
    );

    let composed = [
        missense[0].clone(),
        FilterClause {
            field: "AF_proband".into(),
            operator: FilterOperator::IsBetween,
            target: json!([0.15, 1.0]),
        },
    ];
    let segments = engine
        .retrieve_segments("cohort", &ids_wanted, vec![], vec![], Some(&composed))
        .unwrap();
    assert_eq!(ids(&segments.variants), vec!["chr1:500:C:G", "chr2:100:GAC:G"]);

    let json = serde_json::to_value(&segments).unwrap();
    assert!(json["xScaleDomain"].is_array());
    assert_eq!(json["variants"][0]["id"], "chr1:500:C:G");
}

#[tokio::test]
async fn test_duplicate_tile_ids_are_idempotent() {
    let fx = cohort();
    let engine = TileEngine::new(EngineConfig::default());
    engine.init("cohort", fx.spec.clone()).unwrap();
    engine
        .fetch_tiles_debounced("cohort", &tile_ids(&["0.0", "1.0", "1.1"]))
        .await
        .unwrap();

    let once = engine
        .retrieve_segments("cohort", &tile_ids(&["0.0", "1.0", "1.1"]), vec![], vec![], None)
        .unwrap();
    let twice = engine
        .retrieve_segments(
            "cohort",
            &tile_ids(&["1.1", "0.0", "1.0", "1.0", "0.0", "1.1"]),
            vec![],
            vec![],
            None,
        )
        .unwrap();
    assert_eq!(once, twice);
    assert_eq!(once.variants.len(), 4);
}

#[tokio::test]
async fn test_shared_source_between_datasets() {
    let fx = cohort();
    let engine = TileEngine::new(EngineConfig::default());
    engine.init("high", fx.spec.clone()).unwrap();
    let mut options = fx.spec.options.clone();
    options.filter = vec![FilterClause {
        field: "level".into(),
        operator: FilterOperator::IsEqual,
        target: json!("LOW"),
    }];
    engine.init("low", fx.spec.clone().with_options(options)).unwrap();

    let ids_wanted = tile_ids(&["0.0"]);
    engine.fetch_tiles_debounced("high", &ids_wanted).await.unwrap();
    engine.fetch_tiles_debounced("low", &ids_wanted).await.unwrap();

    let low = engine.retrieve_segments("low", &ids_wanted, vec![], vec![], None).unwrap();
    assert_eq!(ids(&low.variants), vec!["chr1:700:T:TTA"]);
    let high = engine.retrieve_segments("high", &ids_wanted, vec![], vec![], None).unwrap();
    assert_eq!(high.variants.len(), 4);
}

#[tokio::test]
async fn test_missing_files_surface_as_errors() {
    let dir = TempDir::new().unwrap();
    let spec = DatasetSpec::new(
        dir.path().join("absent.vcf.gz").to_string_lossy().into_owned(),
        dir.path().join("absent.sizes").to_string_lossy().into_owned(),
    );
    let engine = TileEngine::new(EngineConfig::default());
    // opening memory-maps the file, so a missing VCF fails at init
    assert!(engine.init("gone", spec).is_err());
    assert!(matches!(
        engine.tile("gone", 0, 0).await,
        Err(VcfTilerError::Engine(EngineError::DatasetNotInitialized(_)))
    ));
}

#[test]
fn test_worker_from_plain_thread() {
    let fx = cohort();
    let worker = TileWorker::spawn(EngineConfig::default()).unwrap();
    let handle = worker.handle();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let tiles = runtime.block_on(async {
        handle.init("cohort", fx.spec.clone()).await.unwrap();
        handle
            .fetch_tiles("cohort", tile_ids(&["1.1", "bogus"]))
            .await
            .unwrap()
    });
    assert_eq!(tiles.keys().collect::<Vec<_>>(), vec!["1.1"]);
    worker.shutdown();
}

fn record(n: usize, af: Option<f64>, level: &str) -> Arc<VariantRecord> {
    let mut fields = BTreeMap::new();
    fields.insert(
        "AF".to_string(),
        af.map(FieldValue::Float).unwrap_or(FieldValue::Null),
    );
    fields.insert("level".to_string(), FieldValue::Str(level.to_string()));
    Arc::new(VariantRecord {
        id: format!("chr1:{}:A:C", n + 1),
        chrom: "chr1".into(),
        multires_chrom: "chr1_0".into(),
        chrom_offset: 0,
        pos: n as u64 + 1,
        from: n as u64 + 1,
        to: n as u64 + 2,
        ref_allele: "A".into(),
        alt: "C".into(),
        vcf_id: None,
        category: VariantCategory::Snv,
        fields,
    })
}

fn arb_records() -> impl Strategy<Value = Vec<Arc<VariantRecord>>> {
    prop::collection::vec(
        (
            prop::option::weighted(0.8, 0.0f64..1.0),
            prop::sample::select(vec!["HIGH", "MODERATE", "LOW", "MODIFIER"]),
        ),
        0..60,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(n, (af, level))| record(n, af, level))
            .collect()
    })
}

fn arb_clause() -> impl Strategy<Value = FilterClause> {
    prop_oneof![
        prop::sample::subsequence(vec!["HIGH", "MODERATE", "LOW", "MODIFIER"], 0..4).prop_map(
            |levels| FilterClause {
                field: "level".into(),
                operator: FilterOperator::IsOneOf,
                target: json!(levels),
            }
        ),
        (0.0f64..1.0, 0.0f64..1.0).prop_map(|(a, b)| FilterClause {
            field: "AF".into(),
            operator: FilterOperator::IsBetween,
            target: json!([a.min(b), a.max(b)]),
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Applying clauses together equals applying them one after another
    #[test]
    fn prop_filter_composition(records in arb_records(), a in arb_clause(), b in arb_clause()) {
        let both = Filter::compile(&[a.clone(), b.clone()]).unwrap().apply(records.clone());
        let chained = Filter::compile(&[b]).unwrap().apply(
            Filter::compile(&[a]).unwrap().apply(records),
        );
        prop_assert_eq!(both, chained);
    }

    /// The limit keeps the largest values and never more than `max`
    #[test]
    fn prop_limit_keeps_top_values(records in arb_records(), max in 0usize..20) {
        let limit = LimitSpec { field: "AF".into(), max };
        let kept = apply_limit(records.clone(), &limit);
        prop_assert!(kept.len() <= max);
        prop_assert_eq!(kept.len(), max.min(records.len()));

        let smallest_kept = kept
            .iter()
            .filter_map(|r| r.field("AF").as_f64())
            .fold(f64::INFINITY, f64::min);
        let kept_ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        for dropped in records.iter().filter(|r| !kept_ids.contains(&r.id.as_str())) {
            if let Some(af) = dropped.field("AF").as_f64() {
                prop_assert!(af <= smallest_kept);
            }
        }
    }
}

#[test]
fn test_is_one_of_scenario() {
    let records = vec![record(0, Some(0.1), "HIGH"), record(1, Some(0.2), "LOW")];
    let clauses = [FilterClause {
        field: "level".into(),
        operator: FilterOperator::IsOneOf,
        target: json!(["HIGH", "MODERATE"]),
    }];
    let kept = Filter::compile(&clauses).unwrap().apply(records);
    assert_eq!(ids(&kept), vec!["chr1:1:A:C"]);
}
