//! Per-source annotation records and their merge policy.

use std::io::{Read, Write};

use enum_map::{EnumArray, EnumMap};
use serde::{Deserialize, Serialize};

use crate::err::SaError;
use crate::sa::codec::{Decode, Encode};
use crate::sa::legacy::{read_tagged, write_tagged, TaggedRecord, TaggedValue};
use crate::sa::sources::DataSource;

pub mod dbsnp;
pub mod evs;
pub mod exac;
pub mod onekg;

pub use dbsnp::DbSnpRecord;
pub use evs::{EvsPopulation, EvsRecord};
pub use exac::{ExacPopulation, ExacRecord};
pub use onekg::{OneKgPopulation, OneKgRecord};

/// Allele count and allele number of one population.
///
/// Frequencies are always derived from the raw counts.
#[derive(
    Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, derive_new::new,
)]
pub struct AlleleCounts {
    /// Number of alternate alleles observed.
    pub count: u32,
    /// Number of alleles called.
    pub total: u32,
}

impl AlleleCounts {
    /// Alternate allele frequency, `None` without called alleles.
    pub fn frequency(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.count as f64 / self.total as f64)
        }
    }
}

/// Result of merging one record into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Receiver had no data and took the other record's data.
    Adopted,
    /// Other record had no data or carried the same data.
    Unchanged,
    /// Data was combined (set-valued sources).
    Combined,
    /// A new conflict was detected; the receiver was cleared.
    Conflicted,
    /// One side was conflicted already.
    AlreadyConflicted,
}

/// Counters of merge outcomes, returned from merges instead of kept globally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeCounters {
    pub adopted: usize,
    pub unchanged: usize,
    pub combined: usize,
    pub conflicted: usize,
    pub already_conflicted: usize,
    /// List items merged with an item of the same identity.
    pub items_merged: usize,
    /// List items added under a new identity.
    pub items_added: usize,
}

impl MergeCounters {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Adopted => self.adopted += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
            MergeOutcome::Combined => self.combined += 1,
            MergeOutcome::Conflicted => self.conflicted += 1,
            MergeOutcome::AlreadyConflicted => self.already_conflicted += 1,
        }
    }
}

impl std::ops::AddAssign for MergeCounters {
    fn add_assign(&mut self, other: Self) {
        self.adopted += other.adopted;
        self.unchanged += other.unchanged;
        self.combined += other.combined;
        self.conflicted += other.conflicted;
        self.already_conflicted += other.already_conflicted;
        self.items_merged += other.items_merged;
        self.items_added += other.items_added;
    }
}

/// Behaviour shared by all per-source records.
///
/// Merging follows a fail-safe-to-absence policy: an empty receiver adopts
/// the other record, identical records agree, and two records carrying
/// different data leave an empty, conflicted record behind.  Conflicts are
/// absorbing, which keeps merging commutative and associative.
pub trait AnnotationRecord: Clone + PartialEq {
    /// Whether the record carries substantive data.
    fn has_data(&self) -> bool;

    /// Drop all data, keeping the conflict flag.
    fn clear(&mut self);

    fn has_conflicts(&self) -> bool;

    fn set_conflicts(&mut self);

    /// Combine two records that both have data, if the source allows it.
    ///
    /// Returns `false` if the records cannot be combined.
    fn combine(&mut self, _other: &Self) -> bool {
        false
    }

    fn merge_with(&mut self, other: &Self) -> MergeOutcome {
        if self.has_conflicts() || other.has_conflicts() {
            self.clear();
            self.set_conflicts();
            return MergeOutcome::AlreadyConflicted;
        }
        if !other.has_data() || self == other {
            return MergeOutcome::Unchanged;
        }
        if !self.has_data() {
            *self = other.clone();
            return MergeOutcome::Adopted;
        }
        if self.combine(other) {
            return MergeOutcome::Combined;
        }
        self.clear();
        self.set_conflicts();
        MergeOutcome::Conflicted
    }
}

/// Record of any allele-specific source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    DbSnp(DbSnpRecord),
    OneKg(OneKgRecord),
    Evs(EvsRecord),
    Exac(ExacRecord),
}

impl SourceRecord {
    pub fn source(&self) -> DataSource {
        match self {
            SourceRecord::DbSnp(_) => DataSource::DbSnp,
            SourceRecord::OneKg(_) => DataSource::OneKg,
            SourceRecord::Evs(_) => DataSource::Evs,
            SourceRecord::Exac(_) => DataSource::Exac,
        }
    }

    pub fn has_data(&self) -> bool {
        match self {
            SourceRecord::DbSnp(record) => record.has_data(),
            SourceRecord::OneKg(record) => record.has_data(),
            SourceRecord::Evs(record) => record.has_data(),
            SourceRecord::Exac(record) => record.has_data(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        match self {
            SourceRecord::DbSnp(record) => record.has_conflicts(),
            SourceRecord::OneKg(record) => record.has_conflicts(),
            SourceRecord::Evs(record) => record.has_conflicts(),
            SourceRecord::Exac(record) => record.has_conflicts(),
        }
    }

    /// Merge a record of the same source into `self`.
    pub fn merge_with(&mut self, other: &SourceRecord) -> Result<MergeOutcome, SaError> {
        Ok(match (self, other) {
            (SourceRecord::DbSnp(lhs), SourceRecord::DbSnp(rhs)) => lhs.merge_with(rhs),
            (SourceRecord::OneKg(lhs), SourceRecord::OneKg(rhs)) => lhs.merge_with(rhs),
            (SourceRecord::Evs(lhs), SourceRecord::Evs(rhs)) => lhs.merge_with(rhs),
            (SourceRecord::Exac(lhs), SourceRecord::Exac(rhs)) => lhs.merge_with(rhs),
            (lhs, rhs) => {
                return Err(SaError::SourceMismatch {
                    expected: lhs.source(),
                    actual: rhs.source(),
                })
            }
        })
    }

    /// Allele counts over all samples, used for the global allele frequencies.
    ///
    /// 1000 Genomes takes precedence over ExAC, ExAC over EVS.
    pub fn all_counts(&self) -> Option<AlleleCounts> {
        match self {
            SourceRecord::DbSnp(_) => None,
            SourceRecord::OneKg(record) => record.populations[OneKgPopulation::All],
            SourceRecord::Evs(record) => record.populations[EvsPopulation::All],
            SourceRecord::Exac(record) => record.populations[ExacPopulation::All],
        }
    }

    /// Decode the payload of a record for `source`.
    pub fn decode_for<R: Read>(source: DataSource, reader: &mut R) -> Result<Self, SaError> {
        let fields = read_tagged(reader)?;
        Ok(match source {
            DataSource::DbSnp => SourceRecord::DbSnp(DbSnpRecord::from_tagged(fields)?),
            DataSource::OneKg => SourceRecord::OneKg(OneKgRecord::from_tagged(fields)?),
            DataSource::Evs => SourceRecord::Evs(EvsRecord::from_tagged(fields)?),
            DataSource::Exac => SourceRecord::Exac(ExacRecord::from_tagged(fields)?),
        })
    }

    /// Decode a payload that must be consumed completely.
    pub fn from_slice_for(source: DataSource, buf: &[u8]) -> Result<Self, SaError> {
        let mut cursor = std::io::Cursor::new(buf);
        let result = Self::decode_for(source, &mut cursor)?;
        if cursor.position() as usize != buf.len() {
            return Err(SaError::MalformedRecord(format!(
                "trailing bytes after {} record",
                source
            )));
        }
        Ok(result)
    }
}

impl Encode for SourceRecord {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        let fields = match self {
            SourceRecord::DbSnp(record) => record.to_tagged()?,
            SourceRecord::OneKg(record) => record.to_tagged()?,
            SourceRecord::Evs(record) => record.to_tagged()?,
            SourceRecord::Exac(record) => record.to_tagged()?,
        };
        write_tagged(writer, &fields)
    }
}

/// Convert allele counts to the `i32` stored in tagged fields.
fn count_to_i32(value: u32) -> Result<i32, SaError> {
    i32::try_from(value)
        .map_err(|_| SaError::MalformedRecord(format!("allele count {} too large", value)))
}

fn count_from_i32(value: i32) -> Result<u32, SaError> {
    u32::try_from(value)
        .map_err(|_| SaError::MalformedRecord(format!("negative allele count {}", value)))
}

/// Append AN/AC tagged fields for each population with counts.
///
/// `ids` yields the (AN id, AC id) pair of a population.
fn populations_to_tagged<P, F>(
    populations: &EnumMap<P, Option<AlleleCounts>>,
    ids: F,
    out: &mut Vec<TaggedRecord>,
) -> Result<(), SaError>
where
    P: EnumArray<Option<AlleleCounts>>,
    F: Fn(P) -> (u8, u8),
{
    for (population, counts) in populations.iter() {
        if let Some(counts) = counts {
            let (an_id, ac_id) = ids(population);
            out.push(TaggedRecord::new(
                an_id,
                TaggedValue::Int32(count_to_i32(counts.total)?),
            )?);
            out.push(TaggedRecord::new(
                ac_id,
                TaggedValue::Int32(count_to_i32(counts.count)?),
            )?);
        }
    }
    Ok(())
}

/// Collects AN/AC halves of populations while reading tagged fields.
struct PopulationCollector<P: EnumArray<(Option<u32>, Option<u32>)>> {
    halves: EnumMap<P, (Option<u32>, Option<u32>)>,
}

impl<P> PopulationCollector<P>
where
    P: EnumArray<(Option<u32>, Option<u32>)> + EnumArray<Option<AlleleCounts>> + Copy,
{
    fn new() -> Self {
        Self {
            halves: EnumMap::default(),
        }
    }

    fn set_total(&mut self, population: P, field: &TaggedRecord) -> Result<(), SaError> {
        self.halves[population].0 = Some(count_from_i32(field.as_int32()?)?);
        Ok(())
    }

    fn set_count(&mut self, population: P, field: &TaggedRecord) -> Result<(), SaError> {
        self.halves[population].1 = Some(count_from_i32(field.as_int32()?)?);
        Ok(())
    }

    fn finish(self) -> Result<EnumMap<P, Option<AlleleCounts>>, SaError> {
        let mut result: EnumMap<P, Option<AlleleCounts>> = EnumMap::default();
        for (population, halves) in self.halves.into_iter() {
            result[population] = match halves {
                (Some(total), Some(count)) => Some(AlleleCounts::new(count, total)),
                (None, None) => None,
                _ => {
                    return Err(SaError::MalformedRecord(
                        "population with only one of allele count and allele number".into(),
                    ))
                }
            };
        }
        Ok(result)
    }
}

/// Log and skip a tagged field with an id unknown in the allele-specific context.
fn skip_unknown_field(source: DataSource, field: &TaggedRecord) {
    tracing::warn!(
        "skipping unknown allele-specific field id {} in {} record",
        field.id(),
        source
    );
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn frequency_is_derived() {
        assert_eq!(AlleleCounts::new(30, 100).frequency(), Some(0.3));
        assert_eq!(AlleleCounts::new(0, 0).frequency(), None);
    }

    #[test]
    fn mismatched_sources() {
        let mut lhs = SourceRecord::DbSnp(DbSnpRecord::from_ids([1]));
        let rhs = SourceRecord::Evs(EvsRecord::default());

        let res = lhs.merge_with(&rhs);
        assert!(
            matches!(
                res,
                Err(SaError::SourceMismatch {
                    expected: DataSource::DbSnp,
                    actual: DataSource::Evs
                })
            ),
            "{:?}",
            res
        );
    }

    /// Header bytes of all tagged fields written by fully populated records.
    #[test]
    fn tagged_headers_are_distinct() -> Result<(), anyhow::Error> {
        let counts = Some(AlleleCounts::new(1, 2));
        let records = [
            SourceRecord::DbSnp(DbSnpRecord::from_ids([1])),
            SourceRecord::OneKg(OneKgRecord::new(
                Some("A".into()),
                EnumMap::from_fn(|_| counts),
            )),
            SourceRecord::Evs(EvsRecord::new(Some(1), Some(2), EnumMap::from_fn(|_| counts))),
            SourceRecord::Exac(ExacRecord::new(Some(1), EnumMap::from_fn(|_| counts))),
        ];

        let mut headers = Vec::new();
        for record in &records {
            for field in read_tagged(&mut std::io::Cursor::new(record.to_vec()?))? {
                assert!(
                    crate::sa::legacy::AlleleSpecificId::from_repr(field.id()).is_some(),
                    "{:?}",
                    field
                );
                headers.push(field.header_byte());
            }
        }
        let distinct = headers.iter().collect::<std::collections::BTreeSet<_>>();

        assert_eq!(distinct.len(), headers.len());
        assert_eq!(headers.len(), 36);
        assert!(headers.iter().all(|header| header & 0x3f != 8));

        Ok(())
    }

    #[test]
    fn counters_accumulate() {
        let mut counters = MergeCounters::default();
        counters.record(MergeOutcome::Adopted);
        counters.record(MergeOutcome::Conflicted);
        let mut total = MergeCounters::default();
        total += counters;
        total += counters;

        assert_eq!(total.adopted, 2);
        assert_eq!(total.conflicted, 2);
        assert_eq!(total.unchanged, 0);
    }
}
