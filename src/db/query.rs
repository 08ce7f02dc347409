//! Implementation of `db query` sub command.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use crate::sa::alleles::canonicalize;
use crate::sa::intervals::SupplementaryInterval;
use crate::sa::query::AlleleAnnotation;
use crate::sa::store::StoreReader;

/// Command line arguments for `db query` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Query supplementary annotation store", long_about = None)]
pub struct Args {
    /// Path to the store file.
    #[arg(long, required = true)]
    pub path_db: PathBuf,
    /// Chromosome name.
    #[arg(long, required = true)]
    pub chrom: String,
    /// 1-based position.
    #[arg(long, required = true)]
    pub pos: i32,
    /// Reference allele.
    #[arg(long = "ref", required = true)]
    pub reference: String,
    /// Alternate allele.
    #[arg(long = "alt", required = true)]
    pub alternate: String,
    /// Optional path to the output JSON file, stdout if omitted.
    #[arg(long)]
    pub path_output: Option<PathBuf>,
}

/// Result of one query.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub annotation: Option<AlleleAnnotation>,
    pub intervals: Vec<SupplementaryInterval>,
}

/// Run the query on an opened store.
pub fn query<R>(reader: &mut StoreReader<R>, args: &Args) -> Result<QueryResult, anyhow::Error>
where
    R: std::io::Read + std::io::Seek,
{
    let allele = canonicalize(args.pos, &args.reference, &args.alternate)?;
    tracing::debug!("canonical allele: {:?}", &allele);

    let annotation = reader.lookup_allele(&args.chrom, allele.start, &allele.alternate)?;
    let span = i32::try_from(args.reference.len().max(1))
        .map_err(|_| anyhow::anyhow!("reference allele too long"))?;
    let end = args
        .pos
        .checked_add(span - 1)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "reference allele at {} runs past the largest position",
                args.pos
            )
        })?;
    let intervals = reader
        .overlapping_intervals(&args.chrom, args.pos, end)
        .into_iter()
        .cloned()
        .collect();
    Ok(QueryResult {
        annotation,
        intervals,
    })
}

/// Main entry point for `db query` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let mut reader = StoreReader::open(&args.path_db)
        .map_err(|e| anyhow::anyhow!("could not open store {:?}: {}", &args.path_db, e))?;
    tracing::info!(
        "opened store for {} built {} with {} data sources",
        reader.header().genome_release.name(),
        reader.header().created,
        reader.header().data_versions.len()
    );

    let result = query(&mut reader, args)?;
    if result.annotation.is_none() {
        tracing::info!("no annotation found for the allele");
    }

    let mut out: Box<dyn Write> = match &args.path_output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    serde_json::to_writer_pretty(&mut out, &result)?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}
