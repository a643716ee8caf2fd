//! vcf-tiler CLI entry point
//!
//! Serves tiles and variant details of a tabix-indexed VCF as JSON, and
//! builds the BGZF/tabix files the engine reads.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use vcf_tiler::core::io;
use vcf_tiler::engine::MAX_TILES;
use vcf_tiler::formats::{bgzf, tabix};
use vcf_tiler::{DatasetOptions, DatasetSpec, EngineConfig, TileWorker, TileWorkerHandle};

/// Name the CLI registers its single dataset under
const DATASET: &str = "cli";

#[derive(Parser)]
#[command(name = "vcf-tiler")]
#[command(about = "Multi-resolution tiles over tabix-indexed cohort VCFs")]
#[command(version)]
#[command(author = "vcf-tiler Contributors")]
struct Cli {
    /// Bins per tile
    #[arg(long = "tile-size", global = true, default_value = "1024")]
    tile_size: u64,

    /// Tile cache capacity
    #[arg(long = "max-tiles", global = true, default_value_t = MAX_TILES)]
    max_tiles: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatasetArgs {
    /// BGZF-compressed VCF (path or http(s) URL)
    vcf: String,
    /// Chromosome sizes file (path or http(s) URL)
    #[arg(short = 'c', long = "chrom-sizes")]
    chrom_sizes: String,
    /// Tabix index (default: <vcf>.tbi)
    #[arg(short = 'i', long)]
    index: Option<String>,
    /// Dataset options JSON file
    #[arg(short = 'o', long)]
    options: Option<PathBuf>,
    /// Read plain chromosome names instead of per-zoom contigs
    #[arg(long = "no-multires")]
    no_multires: bool,
}

impl DatasetArgs {
    fn to_spec(&self) -> anyhow::Result<DatasetSpec> {
        let mut options = match &self.options {
            Some(path) => DatasetOptions::from_path(path)
                .with_context(|| format!("Failed to load options from {:?}", path))?,
            None => DatasetOptions::default(),
        };
        if self.no_multires {
            options.multires = false;
        }

        let mut spec = DatasetSpec::new(self.vcf.clone(), self.chrom_sizes.clone()).with_options(options);
        if let Some(index) = &self.index {
            spec = spec.with_index(index.clone());
        }
        Ok(spec)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tileset descriptor
    Info {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    /// Fetch and decode tiles
    Tiles {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Tile ids, `<zoom>.<index>`
        #[arg(required = true)]
        tile_ids: Vec<String>,
    },
    /// Fetch tiles, then merge, filter and order their variants
    Segments {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Tile ids, `<zoom>.<index>`
        #[arg(required = true)]
        tile_ids: Vec<String>,
        /// Visible genome interval, passed through
        #[arg(long, value_delimiter = ',', default_value = "0,0")]
        domain: Vec<f64>,
        /// Visible pixel interval, passed through
        #[arg(long, value_delimiter = ',', default_value = "0,0")]
        range: Vec<f64>,
    },
    /// Print full VCF records at a position
    Variant {
        #[command(flatten)]
        dataset: DatasetArgs,
        /// Chromosome name
        chrom: String,
        /// 1-based position
        pos: u64,
    },
    /// Build a tabix index, bgzipping plain VCF first
    Index {
        /// Input VCF (plain, gzip or BGZF)
        input: PathBuf,
        /// BGZF output for plain input (default: <input>.gz)
        output: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

async fn open_dataset(handle: &TileWorkerHandle, args: &DatasetArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    eprintln!("Opening dataset: {}", args.vcf);
    handle
        .init(DATASET, args.to_spec()?)
        .await
        .context("Failed to initialize dataset")?;
    let info = handle
        .tileset_info(DATASET)
        .await
        .context("Failed to load header and chromosome sizes")?;
    eprintln!(
        "Dataset ready in {:.2}s ({} bp, max zoom {})",
        start.elapsed().as_secs_f64(),
        info.max_width,
        info.max_zoom
    );
    Ok(())
}

fn index_file(input: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;

    let (vcf_path, index) = if bgzf::is_bgzf(&data) {
        eprintln!("Indexing BGZF file: {:?}", input);
        (input.to_path_buf(), tabix::index_bgzf_vcf(&data)?)
    } else {
        let mut text = Vec::new();
        io::text_reader_from_bytes(&data)
            .read_to_end(&mut text)
            .with_context(|| format!("Failed to decompress {:?}", input))?;
        let output = output.unwrap_or_else(|| {
            let mut name = input.as_os_str().to_owned();
            name.push(".gz");
            PathBuf::from(name)
        });
        eprintln!("Compressing and indexing: {:?} -> {:?}", input, output);
        let (compressed, index) = tabix::compress_and_index_vcf(&text)?;
        fs::write(&output, compressed).with_context(|| format!("Failed to write {:?}", output))?;
        (output, index)
    };

    let mut tbi_name = vcf_path.as_os_str().to_owned();
    tbi_name.push(".tbi");
    let tbi_path = PathBuf::from(tbi_name);
    fs::write(&tbi_path, index.to_bytes()?).with_context(|| format!("Failed to write {:?}", tbi_path))?;

    eprintln!("\n=== Index Statistics ===");
    eprintln!("Contigs:         {}", index.references().len());
    for reference in index.references() {
        eprintln!("  - {:<13} {} bins", reference.name, reference.bins.len());
    }
    eprintln!("Index written:   {:?}", tbi_path);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    if let Commands::Index { input, output } = &cli.command {
        index_file(input, output.clone())?;
        eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
        return Ok(());
    }

    let config = EngineConfig {
        tile_size: cli.tile_size,
        max_tiles: cli.max_tiles,
    };
    let worker = TileWorker::spawn(config).context("Failed to start tile worker")?;
    let handle = worker.handle();

    match cli.command {
        Commands::Info { dataset } => {
            open_dataset(&handle, &dataset).await?;
            print_json(&handle.tileset_info(DATASET).await?)?;
        }

        Commands::Tiles { dataset, tile_ids } => {
            open_dataset(&handle, &dataset).await?;
            let tiles = handle.fetch_tiles(DATASET, tile_ids).await?;
            print_json(&tiles)?;

            eprintln!("\n=== Tile Statistics ===");
            eprintln!("Tiles:           {}", tiles.len());
            eprintln!("Variants:        {}", tiles.values().map(|t| t.len()).sum::<usize>());
        }

        Commands::Segments { dataset, tile_ids, domain, range } => {
            open_dataset(&handle, &dataset).await?;
            handle.fetch_tiles(DATASET, tile_ids.clone()).await?;
            let segments = handle
                .retrieve_segments(DATASET, tile_ids, domain, range, None)
                .await?;
            print_json(&segments)?;

            eprintln!("\n=== Segment Statistics ===");
            eprintln!("Variants:        {}", segments.variants.len());
        }

        Commands::Variant { dataset, chrom, pos } => {
            open_dataset(&handle, &dataset).await?;
            let records = handle.variant_details(DATASET, &chrom, pos).await?;
            if records.is_empty() {
                eprintln!("No records at {}:{}", chrom, pos);
            }
            print_json(&records)?;
        }

        Commands::Index { .. } => {}
    }

    worker.shutdown();
    eprintln!("Time elapsed:    {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}
