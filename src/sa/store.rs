//! The on-disk store: header, framed position records, intervals, index, and footer.
//!
//! ```text
//! header | frame* | u32::MAX | intervals | index | footer
//! ```
//!
//! A frame is a `u32` little-endian payload length followed by one encoded
//! `PositionRecord`.  The index maps each chromosome's positions to frame
//! offsets; the fixed-size footer holds the interval and index offsets.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::{build_chrom_map, canonical_chrom, worker_version, GenomeRelease, CHROMS};
use crate::err::SaError;
use crate::sa::codec::{self, truncated, Decode, Encode};
use crate::sa::intervals::{IntervalIndex, SupplementaryInterval};
use crate::sa::position::PositionRecord;
use crate::sa::query::AlleleAnnotation;

/// Magic bytes at the start of each store.
pub const MAGIC: &[u8; 4] = b"VFSA";
/// Version of the data layout; readers reject other versions.
pub const DATA_VERSION: u16 = 1;
/// Version of the record schema.
pub const SCHEMA_VERSION: u16 = 1;
/// Last value of the footer.
pub const GUARD: u32 = 4041327495;
/// Frame length marking the end of the data section.
const END_OF_DATA: u32 = u32::MAX;
/// Footer size: interval offset, index offset, guard.
const FOOTER_LEN: i64 = 8 + 8 + 4;

/// Version information of one data source in a store.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DataSourceVersion {
    pub name: String,
    pub version: String,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl Encode for DataSourceVersion {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.name)?;
        codec::write_text(writer, &self.version)?;
        codec::write_opt_i32(writer, self.release_date.map(|d| d.num_days_from_ce()))?;
        codec::write_opt_text(writer, self.description.as_deref())
    }
}

impl Decode for DataSourceVersion {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let name = codec::read_text(reader)?;
        let version = codec::read_text(reader)?;
        let release_date = codec::read_opt_i32(reader)?
            .map(|days| {
                NaiveDate::from_num_days_from_ce_opt(days)
                    .ok_or_else(|| SaError::MalformedRecord(format!("invalid date {}", days)))
            })
            .transpose()?;
        let description = codec::read_opt_text(reader)?;
        Ok(Self {
            name,
            version,
            release_date,
            description,
        })
    }
}

/// Store header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    pub genome_release: GenomeRelease,
    pub created: DateTime<Utc>,
    pub worker_version: String,
    pub data_versions: Vec<DataSourceVersion>,
}

impl StoreHeader {
    pub fn new(genome_release: GenomeRelease, data_versions: Vec<DataSourceVersion>) -> Self {
        Self {
            genome_release,
            created: Utc::now(),
            worker_version: worker_version().to_string(),
            data_versions,
        }
    }
}

impl Encode for StoreHeader {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        writer.write_all(MAGIC)?;
        writer.write_u16::<LittleEndian>(DATA_VERSION)?;
        writer.write_u16::<LittleEndian>(SCHEMA_VERSION)?;
        writer.write_u8(self.genome_release.to_byte())?;
        codec::write_i64(writer, self.created.timestamp())?;
        codec::write_text(writer, &self.worker_version)?;
        codec::write_len(writer, self.data_versions.len())?;
        for data_version in &self.data_versions {
            data_version.encode(writer)?;
        }
        Ok(())
    }
}

impl Decode for StoreHeader {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let invalid = |reason: String| SaError::Framing { offset: 0, reason };

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| invalid(format!("could not read magic bytes: {}", e)))?;
        if &magic != MAGIC {
            return Err(invalid(format!("invalid magic bytes {:x?}", magic)));
        }
        let data_version = reader.read_u16::<LittleEndian>().map_err(truncated("data version"))?;
        let schema_version = reader
            .read_u16::<LittleEndian>()
            .map_err(truncated("schema version"))?;
        if data_version != DATA_VERSION || schema_version != SCHEMA_VERSION {
            return Err(invalid(format!(
                "unsupported data/schema version {}/{}, expected {}/{}",
                data_version, schema_version, DATA_VERSION, SCHEMA_VERSION
            )));
        }
        let release_byte = reader.read_u8().map_err(truncated("genome release"))?;
        let genome_release = GenomeRelease::from_byte(release_byte)
            .ok_or_else(|| invalid(format!("invalid genome release {}", release_byte)))?;
        let timestamp = codec::read_i64(reader)?;
        let created = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| invalid(format!("invalid timestamp {}", timestamp)))?;
        let worker_version = codec::read_text(reader)?;
        let data_versions = (0..codec::read_len(reader)?)
            .map(|_| DataSourceVersion::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            genome_release,
            created,
            worker_version,
            data_versions,
        })
    }
}

/// Counts of a written store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub positions: usize,
    pub intervals: usize,
    pub bytes: u64,
}

/// Writes a store; positions must be passed in chromosome and position order.
pub struct StoreWriter<W: Write> {
    writer: W,
    offset: u64,
    chrom_map: IndexMap<String, usize>,
    last_key: Option<(usize, i32)>,
    index: IndexMap<String, Vec<(i32, u64)>>,
    interval_offset: Option<u64>,
    summary: StoreSummary,
}

impl StoreWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, header: &StoreHeader) -> Result<Self, SaError> {
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write> StoreWriter<W> {
    pub fn new(writer: W, header: &StoreHeader) -> Result<Self, SaError> {
        let mut result = Self {
            writer,
            offset: 0,
            chrom_map: build_chrom_map(),
            last_key: None,
            index: IndexMap::new(),
            interval_offset: None,
            summary: StoreSummary::default(),
        };
        result.write_bytes(&header.to_vec()?)?;
        Ok(result)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), SaError> {
        self.writer.write_all(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Append one framed position record.
    pub fn write_position(&mut self, record: &PositionRecord) -> Result<(), SaError> {
        if self.interval_offset.is_some() {
            return Err(SaError::OutOfOrder {
                chrom: record.chrom.clone(),
                position: record.position,
            });
        }
        let chrom_no = *self
            .chrom_map
            .get(&record.chrom)
            .ok_or_else(|| SaError::UnknownChromosome(record.chrom.clone()))?;
        let key = (chrom_no, record.position);
        if self.last_key.map_or(false, |last_key| key <= last_key) {
            return Err(SaError::OutOfOrder {
                chrom: record.chrom.clone(),
                position: record.position,
            });
        }

        let payload = record.to_vec()?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len != END_OF_DATA)
            .ok_or_else(|| SaError::Framing {
                offset: self.offset,
                reason: format!("record of {} bytes is too large", payload.len()),
            })?;

        self.index
            .entry(CHROMS[chrom_no].to_string())
            .or_default()
            .push((record.position, self.offset));
        self.write_bytes(&len.to_le_bytes())?;
        self.write_bytes(&payload)?;
        self.last_key = Some(key);
        self.summary.positions += 1;
        Ok(())
    }

    /// End the data section and write the interval section.
    pub fn write_intervals(&mut self, intervals: &[SupplementaryInterval]) -> Result<(), SaError> {
        if self.interval_offset.is_some() {
            return Err(SaError::Framing {
                offset: self.offset,
                reason: "interval section written twice".into(),
            });
        }
        self.write_bytes(&END_OF_DATA.to_le_bytes())?;
        self.interval_offset = Some(self.offset);

        let mut buf = Vec::new();
        codec::write_len(&mut buf, intervals.len())?;
        for interval in intervals {
            interval.encode(&mut buf)?;
        }
        self.write_bytes(&buf)?;
        self.summary.intervals = intervals.len();
        Ok(())
    }

    /// Write index and footer, returning the inner writer.
    pub fn finish(mut self) -> Result<(W, StoreSummary), SaError> {
        let interval_offset = match self.interval_offset {
            Some(offset) => offset,
            None => {
                self.write_intervals(&[])?;
                self.interval_offset.unwrap_or_default()
            }
        };

        let index_offset = self.offset;
        let mut buf = Vec::new();
        codec::write_len(&mut buf, self.index.len())?;
        for (chrom, entries) in &self.index {
            codec::write_text(&mut buf, chrom)?;
            codec::write_len(&mut buf, entries.len())?;
            for (position, offset) in entries {
                buf.write_i32::<LittleEndian>(*position)?;
                buf.write_u64::<LittleEndian>(*offset)?;
            }
        }
        buf.write_u64::<LittleEndian>(interval_offset)?;
        buf.write_u64::<LittleEndian>(index_offset)?;
        buf.write_u32::<LittleEndian>(GUARD)?;
        self.write_bytes(&buf)?;
        self.writer.flush()?;

        self.summary.bytes = self.offset;
        Ok((self.writer, self.summary))
    }
}

/// Read one frame starting at `offset`; `None` marks the end of the data section.
fn read_frame<R: Read>(reader: &mut R, offset: u64) -> Result<Option<Vec<u8>>, SaError> {
    let framing = |reason: String| SaError::Framing { offset, reason };

    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| framing(format!("could not read frame length: {}", e)))?;
    if len == END_OF_DATA {
        return Ok(None);
    }
    let mut payload = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len as usize {
        return Err(framing(format!(
            "frame of {} bytes is truncated to {}",
            len,
            payload.len()
        )));
    }
    Ok(Some(payload))
}

/// Random and sequential access to a store.
pub struct StoreReader<R: Read + Seek> {
    reader: R,
    header: StoreHeader,
    data_offset: u64,
    chrom_map: IndexMap<String, usize>,
    index: BTreeMap<String, Vec<(i32, u64)>>,
    intervals: IntervalIndex,
}

impl StoreReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SaError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> StoreReader<R> {
    pub fn new(mut reader: R) -> Result<Self, SaError> {
        reader.seek(SeekFrom::Start(0))?;
        let header = StoreHeader::decode(&mut reader)?;
        let data_offset = reader.stream_position()?;

        let footer_offset = reader.seek(SeekFrom::End(-FOOTER_LEN)).map_err(|e| {
            SaError::Framing {
                offset: 0,
                reason: format!("could not seek to footer: {}", e),
            }
        })?;
        let framing = |reason: String| SaError::Framing {
            offset: footer_offset,
            reason,
        };
        let interval_offset = reader.read_u64::<LittleEndian>()?;
        let index_offset = reader.read_u64::<LittleEndian>()?;
        let guard = reader.read_u32::<LittleEndian>()?;
        if guard != GUARD {
            return Err(framing(format!("invalid guard value {}", guard)));
        }
        if interval_offset < data_offset
            || index_offset < interval_offset
            || index_offset > footer_offset
        {
            return Err(framing(format!(
                "invalid section offsets {}/{}",
                interval_offset, index_offset
            )));
        }

        reader.seek(SeekFrom::Start(interval_offset))?;
        let intervals = (0..codec::read_len(&mut reader)?)
            .map(|_| SupplementaryInterval::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;

        reader.seek(SeekFrom::Start(index_offset))?;
        let mut index = BTreeMap::new();
        for _ in 0..codec::read_len(&mut reader)? {
            let chrom = codec::read_text(&mut reader)?;
            let entries = (0..codec::read_len(&mut reader)?)
                .map(|_| {
                    let position = codec::read_i32(&mut reader)?;
                    let offset = reader
                        .read_u64::<LittleEndian>()
                        .map_err(truncated("index offset"))?;
                    Ok((position, offset))
                })
                .collect::<Result<Vec<_>, SaError>>()?;
            index.insert(chrom, entries);
        }

        Ok(Self {
            reader,
            header,
            data_offset,
            chrom_map: build_chrom_map(),
            index,
            intervals: IntervalIndex::new(intervals)?,
        })
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Number of indexed positions.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded record at the given position, if any.
    pub fn get_position(
        &mut self,
        chrom: &str,
        position: i32,
    ) -> Result<Option<PositionRecord>, SaError> {
        let Some(chrom) = canonical_chrom(&self.chrom_map, chrom) else {
            return Ok(None);
        };
        let Some(entries) = self.index.get(chrom) else {
            return Ok(None);
        };
        let Ok(idx) = entries.binary_search_by_key(&position, |(position, _)| *position) else {
            return Ok(None);
        };
        let offset = entries[idx].1;
        self.reader.seek(SeekFrom::Start(offset))?;
        match read_frame(&mut self.reader, offset)? {
            Some(payload) => Ok(Some(PositionRecord::from_slice(&payload)?)),
            None => Err(SaError::Framing {
                offset,
                reason: "index points at end of data".into(),
            }),
        }
    }

    /// Merged view of one canonical alternate allele at a position.
    pub fn lookup_allele(
        &mut self,
        chrom: &str,
        position: i32,
        alt_allele: &str,
    ) -> Result<Option<AlleleAnnotation>, SaError> {
        Ok(self
            .get_position(chrom, position)?
            .and_then(|record| record.allele_annotation(alt_allele)))
    }

    /// Intervals overlapping the 1-based inclusive range `start..=end`.
    pub fn overlapping_intervals(
        &self,
        chrom: &str,
        start: i32,
        end: i32,
    ) -> Vec<&SupplementaryInterval> {
        match canonical_chrom(&self.chrom_map, chrom) {
            Some(chrom) => self.intervals.overlapping(chrom, start, end),
            None => Vec::new(),
        }
    }

    pub fn intervals(&self) -> &IntervalIndex {
        &self.intervals
    }

    /// Iterate all records in store order.
    pub fn records(&mut self) -> Result<Records<'_, R>, SaError> {
        self.reader.seek(SeekFrom::Start(self.data_offset))?;
        Ok(Records {
            reader: &mut self.reader,
            offset: self.data_offset,
            done: false,
        })
    }
}

/// Cursor over the framed records of a store.
///
/// A record that does not decode yields an error and the cursor moves on to
/// the next frame.  After a framing error the cursor is exhausted.
pub struct Records<'a, R: Read + Seek> {
    reader: &'a mut R,
    offset: u64,
    done: bool,
}

impl<'a, R: Read + Seek> Iterator for Records<'a, R> {
    type Item = Result<PositionRecord, SaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_frame(self.reader, self.offset) {
            Ok(Some(payload)) => {
                self.offset += 4 + payload.len() as u64;
                Some(PositionRecord::from_slice(&payload))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use enum_map::enum_map;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sa::alleles::canonicalize;
    use crate::sa::intervals::VariantType;
    use crate::sa::items::ClinVarItem;
    use crate::sa::records::{AlleleCounts, DbSnpRecord, ExacPopulation, ExacRecord, SourceRecord};

    fn header() -> StoreHeader {
        StoreHeader {
            genome_release: GenomeRelease::Grch37,
            created: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            worker_version: worker_version().to_string(),
            data_versions: vec![DataSourceVersion {
                name: "dbSNP".into(),
                version: "151".into(),
                release_date: NaiveDate::from_ymd_opt(2017, 10, 5),
                description: None,
            }],
        }
    }

    fn record(chrom: &str, position: i32, rs_id: i64) -> Result<PositionRecord, anyhow::Error> {
        let mut result = PositionRecord::new(chrom, position);
        let allele = canonicalize(position, "A", "G")?;
        result.add_allele_record(&allele, SourceRecord::DbSnp(DbSnpRecord::from_ids([rs_id])))?;
        result.add_allele_record(
            &allele,
            SourceRecord::Exac(ExacRecord::new(
                Some(30),
                enum_map! {
                    ExacPopulation::All => Some(AlleleCounts::new(rs_id as u32, 1000)),
                    _ => None,
                },
            )),
        )?;
        result.add_clinvar(ClinVarItem {
            id: format!("RCV{}", rs_id),
            alt_allele: "G".into(),
            ..Default::default()
        });
        result.finalize();
        Ok(result)
    }

    fn write_store(records: &[PositionRecord]) -> Result<Vec<u8>, anyhow::Error> {
        let mut writer = StoreWriter::new(Vec::new(), &header())?;
        for record in records {
            writer.write_position(record)?;
        }
        writer.write_intervals(&[SupplementaryInterval {
            chrom: "1".into(),
            start: 50,
            end: 150,
            variant_type: VariantType::Duplication,
            source: "dgv".into(),
            string_fields: Default::default(),
        }])?;
        let (buf, summary) = writer.finish()?;
        assert_eq!(summary.positions, records.len());
        assert_eq!(summary.intervals, 1);
        assert_eq!(summary.bytes, buf.len() as u64);
        Ok(buf)
    }

    #[test]
    fn write_and_read() -> Result<(), anyhow::Error> {
        let records = vec![record("1", 100, 1)?, record("1", 200, 2)?, record("X", 5, 3)?];
        let buf = write_store(&records)?;

        let mut reader = StoreReader::new(Cursor::new(buf))?;
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.len(), 3);

        assert_eq!(reader.get_position("chr1", 200)?, Some(records[1].clone()));
        assert_eq!(reader.get_position("chrX", 5)?, Some(records[2].clone()));
        assert_eq!(reader.get_position("1", 150)?, None);
        assert_eq!(reader.get_position("2", 100)?, None);

        let annotation = reader.lookup_allele("1", 100, "G")?;
        assert_eq!(
            annotation.map(|a| a.facts.dbsnp_ids),
            Some(vec![1])
        );
        assert!(reader.lookup_allele("1", 100, "T")?.is_none());

        assert_eq!(reader.overlapping_intervals("chr1", 100, 100).len(), 1);
        assert!(reader.overlapping_intervals("1", 151, 160).is_empty());

        let all = reader.records()?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(all, records);

        Ok(())
    }

    #[test]
    fn write_and_read_file() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("store.bin");
        let records = vec![record("2", 10, 7)?];

        let mut writer = StoreWriter::create(&path, &header())?;
        writer.write_position(&records[0])?;
        writer.finish()?;

        let mut reader = StoreReader::open(&path)?;
        assert_eq!(reader.get_position("2", 10)?, Some(records[0].clone()));
        assert!(reader.intervals().is_empty());

        Ok(())
    }

    #[test]
    fn rejects_out_of_order() -> Result<(), anyhow::Error> {
        let mut writer = StoreWriter::new(Vec::new(), &header())?;
        writer.write_position(&record("2", 100, 1)?)?;
        assert!(matches!(
            writer.write_position(&record("1", 200, 2)?),
            Err(SaError::OutOfOrder { .. })
        ));
        assert!(matches!(
            writer.write_position(&record("2", 100, 2)?),
            Err(SaError::OutOfOrder { .. })
        ));

        Ok(())
    }

    #[test]
    fn malformed_record_is_isolated() -> Result<(), anyhow::Error> {
        let records = vec![record("1", 100, 1)?, record("1", 200, 2)?, record("1", 300, 3)?];
        let mut buf = write_store(&records)?;

        // overlong varint as chromosome length of the second record
        let second = StoreReader::new(Cursor::new(buf.clone()))?.index["1"][1].1 as usize;
        buf[second + 4..second + 9].copy_from_slice(&[0xff; 5]);

        let mut reader = StoreReader::new(Cursor::new(buf))?;
        let results = reader.records()?.collect::<Vec<_>>();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().ok(), Some(&records[0]));
        assert!(matches!(results[1], Err(SaError::MalformedRecord(_))));
        assert_eq!(results[2].as_ref().ok(), Some(&records[2]));

        Ok(())
    }

    #[test]
    fn framing_error_ends_stream() -> Result<(), anyhow::Error> {
        let records = vec![record("1", 100, 1)?, record("1", 200, 2)?];
        let mut buf = write_store(&records)?;

        // make the second frame claim more bytes than the file holds
        let second = StoreReader::new(Cursor::new(buf.clone()))?.index["1"][1].1 as usize;
        buf[second..second + 4].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());

        let mut reader = StoreReader::new(Cursor::new(buf))?;
        let results = reader.records()?.collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SaError::Framing { .. })));

        Ok(())
    }

    #[rstest::rstest]
    #[case(0, 0x00)]
    #[case(-1, 0x00)]
    fn corrupt_store_is_rejected(
        #[case] index: isize,
        #[case] value: u8,
    ) -> Result<(), anyhow::Error> {
        let mut buf = write_store(&[record("1", 100, 1)?])?;
        let index = if index < 0 {
            (buf.len() as isize + index) as usize
        } else {
            index as usize
        };
        buf[index] = value;

        assert!(matches!(
            StoreReader::new(Cursor::new(buf)),
            Err(SaError::Framing { .. })
        ));

        Ok(())
    }
}
