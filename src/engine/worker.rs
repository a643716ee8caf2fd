//! Dedicated tile worker thread
//!
//! The engine is single-threaded; `TileWorker` gives it an OS thread of
//! its own with a current-thread tokio runtime and a `LocalSet`. Callers
//! on any thread or runtime talk to it through a cloneable
//! `TileWorkerHandle`. Each request runs as its own local task so that
//! network waits of different requests interleave.

use crate::core::error::{EngineError, Result, VcfTilerError};
use crate::core::tileset::TilesetInfo;
use crate::engine::cache::Tile;
use crate::engine::coordinator::{DatasetSpec, SegmentSet, TileEngine};
use crate::engine::options::{EngineConfig, FilterClause};
use crate::formats::vcf::VcfRecord;
use log::{debug, error};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Messages accepted by the worker
#[derive(Debug)]
pub enum WorkerRequest {
    Init {
        dataset: String,
        spec: DatasetSpec,
        reply: Reply<()>,
    },
    TilesetInfo {
        dataset: String,
        reply: Reply<TilesetInfo>,
    },
    FetchTiles {
        dataset: String,
        tile_ids: Vec<String>,
        reply: Reply<BTreeMap<String, Tile>>,
    },
    RetrieveSegments {
        dataset: String,
        tile_ids: Vec<String>,
        x_scale_domain: Vec<f64>,
        x_scale_range: Vec<f64>,
        filter: Option<Vec<FilterClause>>,
        reply: Reply<SegmentSet>,
    },
    VariantDetails {
        dataset: String,
        chrom: String,
        pos: u64,
        reply: Reply<Vec<VcfRecord>>,
    },
    Shutdown,
}

/// Owns the worker thread
pub struct TileWorker {
    handle: TileWorkerHandle,
    thread: Option<JoinHandle<()>>,
}

impl TileWorker {
    /// Start the worker thread with a fresh engine
    pub fn spawn(config: EngineConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("vcf-tiler-worker".to_string())
            .spawn(move || run(config, rx))?;

        Ok(Self {
            handle: TileWorkerHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> TileWorkerHandle {
        self.handle.clone()
    }

    /// Ask the worker to stop and wait for its thread
    ///
    /// Requests still in flight are dropped; their callers see
    /// `EngineError::WorkerUnavailable`.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("tile worker thread panicked");
            }
        }
    }
}

impl Drop for TileWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(config: EngineConfig, mut rx: mpsc::UnboundedReceiver<WorkerRequest>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("cannot start tile worker runtime: {}", e);
            return;
        }
    };

    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let engine = Rc::new(TileEngine::new(config));
        debug!(
            "tile worker started (tile size {}, {} cached tiles)",
            config.tile_size, config.max_tiles
        );

        while let Some(request) = rx.recv().await {
            if matches!(request, WorkerRequest::Shutdown) {
                break;
            }
            let engine = engine.clone();
            tokio::task::spawn_local(async move { handle(&engine, request).await });
        }
        debug!("tile worker stopped");
    });
}

async fn handle(engine: &TileEngine, request: WorkerRequest) {
    // a dropped receiver means the caller lost interest
    match request {
        WorkerRequest::Init {
            dataset,
            spec,
            reply,
        } => {
            let _ = reply.send(engine.init(&dataset, spec));
        }
        WorkerRequest::TilesetInfo { dataset, reply } => {
            let _ = reply.send(engine.tileset_info(&dataset).await);
        }
        WorkerRequest::FetchTiles {
            dataset,
            tile_ids,
            reply,
        } => {
            let _ = reply.send(engine.fetch_tiles_debounced(&dataset, &tile_ids).await);
        }
        WorkerRequest::RetrieveSegments {
            dataset,
            tile_ids,
            x_scale_domain,
            x_scale_range,
            filter,
            reply,
        } => {
            let _ = reply.send(engine.retrieve_segments(
                &dataset,
                &tile_ids,
                x_scale_domain,
                x_scale_range,
                filter.as_deref(),
            ));
        }
        WorkerRequest::VariantDetails {
            dataset,
            chrom,
            pos,
            reply,
        } => {
            let _ = reply.send(engine.variant_details(&dataset, &chrom, pos).await);
        }
        WorkerRequest::Shutdown => {}
    }
}

/// Cloneable, `Send` client of a `TileWorker`
#[derive(Debug, Clone)]
pub struct TileWorkerHandle {
    tx: mpsc::UnboundedSender<WorkerRequest>,
}

impl TileWorkerHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> WorkerRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| VcfTilerError::from(EngineError::WorkerUnavailable))?;
        response
            .await
            .map_err(|_| VcfTilerError::from(EngineError::WorkerUnavailable))?
    }

    pub async fn init(&self, dataset: &str, spec: DatasetSpec) -> Result<()> {
        let dataset = dataset.to_string();
        self.call(|reply| WorkerRequest::Init {
            dataset,
            spec,
            reply,
        })
        .await
    }

    pub async fn tileset_info(&self, dataset: &str) -> Result<TilesetInfo> {
        let dataset = dataset.to_string();
        self.call(|reply| WorkerRequest::TilesetInfo { dataset, reply })
            .await
    }

    pub async fn fetch_tiles(
        &self,
        dataset: &str,
        tile_ids: Vec<String>,
    ) -> Result<BTreeMap<String, Tile>> {
        let dataset = dataset.to_string();
        self.call(|reply| WorkerRequest::FetchTiles {
            dataset,
            tile_ids,
            reply,
        })
        .await
    }

    pub async fn retrieve_segments(
        &self,
        dataset: &str,
        tile_ids: Vec<String>,
        x_scale_domain: Vec<f64>,
        x_scale_range: Vec<f64>,
        filter: Option<Vec<FilterClause>>,
    ) -> Result<SegmentSet> {
        let dataset = dataset.to_string();
        self.call(|reply| WorkerRequest::RetrieveSegments {
            dataset,
            tile_ids,
            x_scale_domain,
            x_scale_range,
            filter,
            reply,
        })
        .await
    }

    pub async fn variant_details(&self, dataset: &str, chrom: &str, pos: u64) -> Result<Vec<VcfRecord>> {
        let dataset = dataset.to_string();
        let chrom = chrom.to_string();
        self.call(|reply| WorkerRequest::VariantDetails {
            dataset,
            chrom,
            pos,
            reply,
        })
        .await
    }

    /// True while the worker is accepting requests
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::options::DatasetOptions;
    use crate::formats::tabix::compress_and_index_vcf;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_dataset(dir: &TempDir) -> DatasetSpec {
        let text = "##fileformat=VCFv4.2\n\
##INFO=<ID=AF,Number=A,Type=Float,Description=\"AF\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr1\t100\t.\tA\tG\t.\tPASS\tAF=0.25\n\
chr1\t700\trs7\tC\tT,G\t.\tPASS\tAF=0.5,0.125\n";
        let (vcf, index) = compress_and_index_vcf(text.as_bytes()).unwrap();
        let vcf_path = dir.path().join("w.vcf.gz");
        let tbi_path = dir.path().join("w.tbi");
        let sizes_path = dir.path().join("w.sizes");
        fs::write(&vcf_path, vcf).unwrap();
        fs::write(&tbi_path, index.to_bytes().unwrap()).unwrap();
        fs::write(&sizes_path, "chr1\t1000\n").unwrap();

        DatasetSpec::new(
            vcf_path.to_string_lossy().into_owned(),
            sizes_path.to_string_lossy().into_owned(),
        )
        .with_index(tbi_path.to_string_lossy().into_owned())
        .with_options(
            DatasetOptions::from_value(json!({
                "multires": false,
                "infoFields": [{"name": "AF", "type": "float"}]
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_round_trip_through_worker() {
        let dir = TempDir::new().unwrap();
        let worker = TileWorker::spawn(EngineConfig::default()).unwrap();
        let handle = worker.handle();

        handle.init("w", write_dataset(&dir)).await.unwrap();
        let info = handle.tileset_info("w").await.unwrap();
        assert_eq!(info.max_pos, [1000]);

        let tiles = handle.fetch_tiles("w", vec!["0.0".into()]).await.unwrap();
        assert_eq!(tiles["0.0"].len(), 3);

        let segments = handle
            .retrieve_segments("w", vec!["0.0".into()], vec![0.0, 1000.0], vec![0.0, 500.0], None)
            .await
            .unwrap();
        assert_eq!(segments.variants.len(), 3);
        assert_eq!(segments.variants[0].id, "chr1:100:A:G");

        let details = handle.variant_details("w", "chr1", 700).await.unwrap();
        assert_eq!(details[0].alt, vec!["T".to_string(), "G".to_string()]);

        worker.shutdown();
        assert!(matches!(
            handle.tileset_info("w").await,
            Err(VcfTilerError::Engine(EngineError::WorkerUnavailable))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_callers() {
        let dir = TempDir::new().unwrap();
        let worker = TileWorker::spawn(EngineConfig::default()).unwrap();
        let handle = worker.handle();
        handle.init("w", write_dataset(&dir)).await.unwrap();

        let calls = (0..4).map(|_| {
            let handle = handle.clone();
            async move { handle.fetch_tiles("w", vec!["1.0".into(), "1.1".into()]).await }
        });
        for tiles in futures::future::join_all(calls).await {
            let tiles = tiles.unwrap();
            assert_eq!(tiles["1.0"].len(), 1);
            assert_eq!(tiles["1.1"].len(), 2);
        }
    }

    #[tokio::test]
    async fn test_errors_cross_the_channel() {
        let worker = TileWorker::spawn(EngineConfig::default()).unwrap();
        let handle = worker.handle();
        assert!(handle.is_running());
        assert!(matches!(
            handle.fetch_tiles("missing", vec!["0.0".into()]).await,
            Err(VcfTilerError::Engine(EngineError::DatasetNotInitialized(_)))
        ));
    }
}
