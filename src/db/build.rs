//! Implementation of `db build` sub command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use thousands::Separable;

use crate::common::{self, io::expand_path_args};
use crate::db::conf::BuildConf;
use crate::db::input::{load_file, Loaded};
use crate::sa::merge::PositionMap;
use crate::sa::store::{StoreHeader, StoreSummary, StoreWriter};

/// Command line arguments for `db build` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Build supplementary annotation store", long_about = None)]
pub struct Args {
    /// Path to the JSON build configuration.
    #[arg(long, required = true)]
    pub path_conf: PathBuf,
    /// Additional item TSV files; `@path` reads a list of paths from a file.
    #[arg(long)]
    pub path_input: Vec<String>,
    /// Path to the output store file.
    #[arg(long, required = true)]
    pub path_output: PathBuf,
    /// Number of threads to use for parsing the inputs.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

/// Load all inputs in parallel, one position map per file.
fn load_inputs(paths: &[PathBuf]) -> Result<Vec<Loaded>, anyhow::Error> {
    paths
        .par_iter()
        .map(|path| {
            let before_loading = Instant::now();
            let loaded = load_file(path)
                .map_err(|e| anyhow::anyhow!("loading {:?} failed: {}", path, e))?;
            tracing::info!(
                "  loaded {} rows ({} rejected) from {:?} in {:?}",
                loaded.rows.separate_with_commas(),
                loaded.rejected.separate_with_commas(),
                path,
                before_loading.elapsed()
            );
            Ok::<_, anyhow::Error>(loaded)
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()
}

/// Merge the per-file maps in input order.
fn merge_loaded(loaded: Vec<Loaded>) -> Result<(PositionMap, usize, usize), anyhow::Error> {
    let mut result = PositionMap::new();
    let (mut rows, mut rejected) = (0, 0);
    for loaded in loaded {
        rows += loaded.rows;
        rejected += loaded.rejected;
        result.merge(loaded.positions)?;
    }
    result.finalize();
    Ok((result, rows, rejected))
}

/// Write the finalized positions and intervals to `path`.
fn write_store(
    path: &Path,
    header: &StoreHeader,
    positions: &PositionMap,
) -> Result<StoreSummary, anyhow::Error> {
    let mut writer = StoreWriter::create(path, header)
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path, e))?;
    for record in positions.positions().filter(|record| !record.is_empty()) {
        writer.write_position(record)?;
    }
    writer.write_intervals(positions.intervals())?;
    let (_, summary) = writer.finish()?;
    Ok(summary)
}

/// Main entry point for `db build` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    if let Some(num_threads) = args.num_threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| anyhow::anyhow!("building global Rayon thread pool failed: {}", e))?;
    }

    let conf = BuildConf::load(&args.path_conf)?;
    let base_dir = args
        .path_conf
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut paths = conf.input_paths(&base_dir);
    paths.extend(expand_path_args(&args.path_input)?.into_iter().map(PathBuf::from));
    if paths.is_empty() {
        anyhow::bail!("no input files given");
    }
    tracing::info!("loading {} input files...", paths.len());

    let before_loading = Instant::now();
    let loaded = load_inputs(&paths)?;
    tracing::info!("... done loading in {:?}", before_loading.elapsed());
    common::trace_rss_now();

    let before_merging = Instant::now();
    let (positions, rows, rejected) = merge_loaded(loaded)?;
    let counters = positions.counters();
    tracing::info!(
        "merged {} rows into {} positions in {:?}",
        rows.separate_with_commas(),
        positions.len().separate_with_commas(),
        before_merging.elapsed()
    );
    tracing::info!(
        "  adopted={} agreed={} unioned={} conflicts={} (already conflicted={})",
        counters.adopted.separate_with_commas(),
        counters.unchanged.separate_with_commas(),
        counters.combined.separate_with_commas(),
        counters.conflicted.separate_with_commas(),
        counters.already_conflicted.separate_with_commas(),
    );
    tracing::info!(
        "  list items added={} merged={}",
        counters.items_added.separate_with_commas(),
        counters.items_merged.separate_with_commas(),
    );
    if rejected > 0 {
        tracing::warn!("rejected {} input rows", rejected.separate_with_commas());
    }

    let before_writing = Instant::now();
    let header = StoreHeader::new(conf.genome_release, conf.data_versions());
    let summary = write_store(&args.path_output, &header, &positions)?;
    tracing::info!(
        "wrote {} positions and {} intervals ({} bytes) to {:?} in {:?}",
        summary.positions.separate_with_commas(),
        summary.intervals.separate_with_commas(),
        summary.bytes.separate_with_commas(),
        &args.path_output,
        before_writing.elapsed()
    );
    common::trace_rss_now();

    tracing::info!("All of `db build` completed in {:?}", before_anything.elapsed());
    Ok(())
}
