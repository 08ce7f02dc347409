//! Implementation of `db dump` sub command.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use thousands::Separable;

use crate::common::io::open_write_maybe_gz;
use crate::err::SaError;
use crate::sa::store::StoreReader;

/// Command line arguments for `db dump` sub command.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump supplementary annotation store as JSONL",
    long_about = None
)]
pub struct Args {
    /// Path to the store file.
    #[arg(long, required = true)]
    pub path_db: PathBuf,
    /// Path to the output JSONL file, `.gz` for compression.
    #[arg(long, required = true)]
    pub path_output: PathBuf,
    /// Also dump the intervals, one JSON object per line after the positions.
    #[arg(long, default_value_t = false)]
    pub with_intervals: bool,
}

/// Counts of a dump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    pub positions: usize,
    pub malformed: usize,
    pub intervals: usize,
}

/// Write all records of `reader` to `out` as JSON lines.
pub fn dump<R, W>(
    reader: &mut StoreReader<R>,
    out: &mut W,
    with_intervals: bool,
) -> Result<DumpSummary, anyhow::Error>
where
    R: std::io::Read + std::io::Seek,
    W: Write,
{
    let mut summary = DumpSummary::default();
    for record in reader.records()? {
        match record {
            Ok(record) => {
                serde_json::to_writer(&mut *out, &record.annotation())?;
                writeln!(out)?;
                summary.positions += 1;
            }
            Err(SaError::MalformedRecord(msg)) => {
                tracing::warn!("skipping malformed record: {}", msg);
                summary.malformed += 1;
            }
            Err(e) => return Err(anyhow::anyhow!("could not read records: {}", e)),
        }
    }
    if with_intervals {
        for interval in reader.intervals().iter() {
            serde_json::to_writer(&mut *out, interval)?;
            writeln!(out)?;
            summary.intervals += 1;
        }
    }
    Ok(summary)
}

/// Main entry point for `db dump` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let mut reader = StoreReader::open(&args.path_db)
        .map_err(|e| anyhow::anyhow!("could not open store {:?}: {}", &args.path_db, e))?;
    tracing::info!("header = {}", serde_json::to_string(reader.header())?);

    let mut out = open_write_maybe_gz(&args.path_output)?;
    let summary = dump(&mut reader, &mut out, args.with_intervals)?;
    out.flush()?;

    tracing::info!(
        "dumped {} positions and {} intervals in {:?}",
        summary.positions.separate_with_commas(),
        summary.intervals.separate_with_commas(),
        before_anything.elapsed()
    );
    if summary.malformed > 0 {
        tracing::warn!(
            "skipped {} malformed records",
            summary.malformed.separate_with_commas()
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::{BufRead, Cursor};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::build::test::setup_inputs;

    fn build(tmp_dir: &temp_testdir::TempDir) -> Result<PathBuf, anyhow::Error> {
        let path_output = tmp_dir.join("out.bin");
        crate::db::build::run(
            &Default::default(),
            &crate::db::build::Args {
                path_conf: setup_inputs(tmp_dir)?,
                path_input: vec![],
                path_output: path_output.clone(),
                num_threads: None,
            },
        )?;
        Ok(path_output)
    }

    #[rstest::rstest]
    #[case("dump.jsonl")]
    #[case("dump.jsonl.gz")]
    fn run_dump(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let args = Args {
            path_db: build(&tmp_dir)?,
            path_output: tmp_dir.join(filename),
            with_intervals: true,
        };

        run(&Default::default(), &args)?;

        let lines = crate::common::io::open_read_maybe_gz(tmp_dir.join(filename))?
            .lines()
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(&lines[0])?;
        assert_eq!(first["chrom"], "1");
        assert_eq!(first["position"], 1000);
        assert_eq!(first["alleles"].as_array().map(Vec::len), Some(2));
        let interval: serde_json::Value = serde_json::from_str(&lines[2])?;
        assert_eq!(interval["source"], "clinvar");

        Ok(())
    }

    #[tracing_test::traced_test]
    #[test]
    fn skips_malformed() {
        let tmp_dir = temp_testdir::TempDir::default();
        let mut buf = std::fs::read(build(&tmp_dir).unwrap()).unwrap();
        let header = StoreReader::new(Cursor::new(buf.clone()))
            .unwrap()
            .header()
            .clone();
        let header_len = crate::sa::codec::Encode::to_vec(&header).unwrap().len();
        // overlong varint as chromosome length of the first record
        buf[header_len + 4..header_len + 9].copy_from_slice(&[0xff; 5]);

        let mut reader = StoreReader::new(Cursor::new(buf)).unwrap();
        let mut out = Vec::new();
        let summary = dump(&mut reader, &mut out, false).unwrap();

        assert_eq!(summary.positions, 1);
        assert_eq!(summary.malformed, 1);
        assert!(logs_contain("skipping malformed record"));
    }
}
