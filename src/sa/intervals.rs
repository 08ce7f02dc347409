//! Supplementary intervals: structural annotations with an explicit end.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::{build_chrom_map, CHROMS};
use crate::err::SaError;
use crate::sa::codec::{self, Decode, Encode};

/// Type of a structural variant interval.
#[derive(
    Serialize,
    Deserialize,
    strum::FromRepr,
    strum::Display,
    strum::EnumString,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Debug,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum VariantType {
    CopyNumberGain = 0,
    CopyNumberLoss = 1,
    CopyNumberVariation = 2,
    Deletion = 3,
    Duplication = 4,
    TandemDuplication = 5,
    Insertion = 6,
    Inversion = 7,
    Translocation = 8,
    ComplexStructuralAlteration = 9,
}

/// One interval annotation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SupplementaryInterval {
    /// Canonical chromosome name.
    pub chrom: String,
    /// 1-based start position.
    pub start: i32,
    /// 1-based inclusive end position.
    pub end: i32,
    pub variant_type: VariantType,
    /// Name of the source, e.g., `clinvar` or `dgv`.
    pub source: String,
    #[serde(default)]
    pub string_fields: BTreeMap<String, String>,
}

impl Encode for SupplementaryInterval {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.chrom)?;
        codec::write_i32(writer, self.start)?;
        codec::write_i32(writer, self.end)?;
        writer.write_all(&[self.variant_type as u8])?;
        codec::write_text(writer, &self.source)?;
        codec::write_len(writer, self.string_fields.len())?;
        for (key, value) in &self.string_fields {
            codec::write_text(writer, key)?;
            codec::write_text(writer, value)?;
        }
        Ok(())
    }
}

impl Decode for SupplementaryInterval {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let chrom = codec::read_text(reader)?;
        let start = codec::read_i32(reader)?;
        let end = codec::read_i32(reader)?;
        let mut type_byte = [0u8; 1];
        reader
            .read_exact(&mut type_byte)
            .map_err(codec::truncated("variant type"))?;
        let variant_type = VariantType::from_repr(type_byte[0]).ok_or_else(|| {
            SaError::MalformedRecord(format!("invalid variant type {}", type_byte[0]))
        })?;
        let source = codec::read_text(reader)?;
        let mut string_fields = BTreeMap::new();
        for _ in 0..codec::read_len(reader)? {
            let key = codec::read_text(reader)?;
            string_fields.insert(key, codec::read_text(reader)?);
        }
        Ok(Self {
            chrom,
            start,
            end,
            variant_type,
            source,
            string_fields,
        })
    }
}

type IntervalTree = ArrayBackedIntervalTree<i32, u32>;

/// Per-chromosome interval trees over the intervals of a store.
#[derive(Debug)]
pub struct IntervalIndex {
    chrom_map: IndexMap<String, usize>,
    records: Vec<Vec<SupplementaryInterval>>,
    trees: Vec<IntervalTree>,
}

impl IntervalIndex {
    pub fn new(intervals: Vec<SupplementaryInterval>) -> Result<Self, SaError> {
        let chrom_map = build_chrom_map();
        let mut records: Vec<Vec<SupplementaryInterval>> = vec![Vec::new(); CHROMS.len()];
        let mut trees: Vec<IntervalTree> = (0..CHROMS.len()).map(|_| IntervalTree::new()).collect();

        for interval in intervals {
            let chrom_no = *chrom_map
                .get(&interval.chrom)
                .ok_or_else(|| SaError::UnknownChromosome(interval.chrom.clone()))?;
            if interval.end < interval.start {
                return Err(SaError::MalformedRecord(format!(
                    "interval {}:{}-{} ends before it starts",
                    interval.chrom, interval.start, interval.end
                )));
            }
            let Some(stop) = interval.end.checked_add(1) else {
                return Err(SaError::MalformedRecord(format!(
                    "interval {}:{}-{} ends past the largest position",
                    interval.chrom, interval.start, interval.end
                )));
            };
            let key = records[chrom_no].len() as u32;
            trees[chrom_no].insert(interval.start..stop, key);
            records[chrom_no].push(interval);
        }
        trees.iter_mut().for_each(|tree| tree.index());

        Ok(Self {
            chrom_map,
            records,
            trees,
        })
    }

    /// Intervals overlapping the 1-based inclusive range `start..=end`.
    pub fn overlapping(&self, chrom: &str, start: i32, end: i32) -> Vec<&SupplementaryInterval> {
        let Some(chrom_no) = self.chrom_map.get(chrom) else {
            return Vec::new();
        };
        if end < start {
            return Vec::new();
        }
        let mut result = self.trees[*chrom_no]
            .find(start..end.saturating_add(1))
            .iter()
            .map(|entry| &self.records[*chrom_no][*entry.data() as usize])
            .collect::<Vec<_>>();
        result.sort_by_key(|interval| (interval.start, interval.end));
        result
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All intervals in chromosome order.
    pub fn iter(&self) -> impl Iterator<Item = &SupplementaryInterval> {
        self.records.iter().flatten()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn interval(chrom: &str, start: i32, end: i32) -> SupplementaryInterval {
        SupplementaryInterval {
            chrom: chrom.into(),
            start,
            end,
            variant_type: VariantType::CopyNumberLoss,
            source: "dgv".into(),
            string_fields: [("id".to_string(), format!("{}-{}", start, end))]
                .into_iter()
                .collect(),
        }
    }

    #[rstest::rstest]
    #[case(1, 99, 0)]
    #[case(100, 100, 1)]
    #[case(200, 200, 2)]
    #[case(201, 250, 1)]
    #[case(301, 400, 0)]
    fn overlaps(
        #[case] start: i32,
        #[case] end: i32,
        #[case] expected: usize,
    ) -> Result<(), anyhow::Error> {
        let index = IntervalIndex::new(vec![
            interval("1", 100, 200),
            interval("1", 150, 300),
            interval("2", 1, 1000),
        ])?;

        assert_eq!(index.overlapping("1", start, end).len(), expected);
        assert_eq!(index.len(), 3);

        Ok(())
    }

    #[test]
    fn largest_positions() -> Result<(), anyhow::Error> {
        assert!(matches!(
            IntervalIndex::new(vec![interval("1", 100, i32::MAX)]),
            Err(SaError::MalformedRecord(_))
        ));

        let index = IntervalIndex::new(vec![interval("1", 100, 200)])?;
        assert_eq!(index.overlapping("1", 150, i32::MAX).len(), 1);

        Ok(())
    }

    #[test]
    fn unknown_chromosome() {
        assert!(matches!(
            IntervalIndex::new(vec![interval("chrUn", 1, 2)]),
            Err(SaError::UnknownChromosome(_))
        ));
    }

    #[test]
    fn binary() -> Result<(), anyhow::Error> {
        let original = interval("X", 1000, 2000);
        assert_eq!(
            SupplementaryInterval::from_slice(&original.to_vec()?)?,
            original
        );

        Ok(())
    }
}
