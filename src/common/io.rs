//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path.as_ref(), e))?;
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path.as_ref(), e))?;
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Expand the paths given on the command line.
///
/// An argument `@path` is replaced by the non-empty, non-comment lines of
/// the file at `path`.
pub fn expand_path_args(args: &[String]) -> Result<Vec<String>, anyhow::Error> {
    let mut result = Vec::new();
    for arg in args {
        if let Some(list_path) = arg.strip_prefix('@') {
            let reader = open_read_maybe_gz(list_path)?;
            for line in reader.lines() {
                let line = line?;
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    result.push(line.to_string());
                }
            }
        } else {
            result.push(arg.clone());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case("test.txt")]
    #[case("test.txt.gz")]
    fn write_then_read(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();

        {
            let mut f = super::open_write_maybe_gz(tmp_dir.join(filename))?;
            f.write_all(b"hello\nworld\n")?;
            f.flush()?;
        }

        let mut raw = Vec::new();
        std::fs::File::open(tmp_dir.join(filename))?.read_to_end(&mut raw)?;
        // gzip magic bytes
        assert_eq!(raw.starts_with(&[0x1f, 0x8b]), filename.ends_with(".gz"));

        let mut buf = String::new();
        super::open_read_maybe_gz(tmp_dir.join(filename))?.read_to_string(&mut buf)?;
        assert_eq!(buf, "hello\nworld\n");

        Ok(())
    }

    #[test]
    fn expand_path_args() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let list_path = tmp_dir.join("paths.txt");
        std::fs::write(&list_path, "# inputs\na.tsv\n\n b.tsv.gz \n")?;

        let args = vec![
            "first.tsv".to_string(),
            format!("@{}", list_path.display()),
        ];
        assert_eq!(
            super::expand_path_args(&args)?,
            vec!["first.tsv", "a.tsv", "b.tsv.gz"]
        );

        Ok(())
    }

    #[test]
    fn missing_file() {
        assert!(super::open_read_maybe_gz("/does/not/exist.tsv").is_err());
    }
}
