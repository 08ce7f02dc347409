//! Registry of the allele-specific data sources and their bit numbering.
//!
//! The bit index of a source is part of the on-disk format.  New sources get
//! the next free bit; existing sources are never renumbered.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::err::SaError;

/// Allele-specific data sources, declared in bit order.
#[derive(
    Serialize,
    Deserialize,
    enum_map::Enum,
    strum::EnumIter,
    strum::EnumString,
    strum::Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Debug,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataSource {
    /// dbSNP rs ids
    DbSnp,
    /// 1000 Genomes allele frequencies
    OneKg,
    /// Exome Variant Server allele frequencies
    Evs,
    /// ExAC allele frequencies
    Exac,
}

impl DataSource {
    /// Bit index of the source in slot bitmasks.
    pub const fn bit_index(self) -> u8 {
        match self {
            DataSource::DbSnp => 0,
            DataSource::OneKg => 1,
            DataSource::Evs => 2,
            DataSource::Exac => 3,
        }
    }

    /// Resolve a bit index back to its source.
    pub fn from_bit_index(index: u8) -> Result<Self, SaError> {
        DataSource::iter()
            .find(|source| source.bit_index() == index)
            .ok_or(SaError::UnknownDataSource(index))
    }

    /// Single-bit mask of the source.
    pub const fn bit(self) -> u8 {
        1 << self.bit_index()
    }

    /// All sources in ascending bit order.
    pub fn all() -> impl Iterator<Item = DataSource> {
        DataSource::iter()
    }
}

/// Bitmask of sources present for an allele.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceMask(u8);

impl SourceMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw bits as read from disk, including bits of unknown sources.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn add(&mut self, source: DataSource) {
        self.0 |= source.bit();
    }

    pub fn remove(&mut self, source: DataSource) {
        self.0 &= !source.bit();
    }

    pub fn has(self, source: DataSource) -> bool {
        self.0 & source.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Known sources with their bit set, ascending.
    pub fn iter(self) -> impl Iterator<Item = DataSource> {
        DataSource::all().filter(move |source| self.has(*source))
    }

    /// Bits set in the mask that do not belong to a known source.
    pub fn unknown_bits(self) -> u8 {
        let known = DataSource::all().fold(0u8, |acc, source| acc | source.bit());
        self.0 & !known
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn declaration_order_is_bit_order() {
        for (i, source) in DataSource::all().enumerate() {
            assert_eq!(source.bit_index() as usize, i);
            assert_eq!(enum_map::Enum::into_usize(source), i);
        }
    }

    #[rstest::rstest]
    #[case(DataSource::DbSnp, 0b0001)]
    #[case(DataSource::OneKg, 0b0010)]
    #[case(DataSource::Evs, 0b0100)]
    #[case(DataSource::Exac, 0b1000)]
    fn bits_are_stable(#[case] source: DataSource, #[case] bit: u8) -> Result<(), anyhow::Error> {
        assert_eq!(source.bit(), bit);
        assert_eq!(DataSource::from_bit_index(source.bit_index())?, source);

        Ok(())
    }

    #[test]
    fn unknown_bit_index() {
        assert!(matches!(
            DataSource::from_bit_index(6),
            Err(SaError::UnknownDataSource(6))
        ));
    }

    #[test]
    fn mask_operations() {
        let mut mask = SourceMask::empty();
        assert!(mask.is_empty());

        mask.add(DataSource::Exac);
        mask.add(DataSource::DbSnp);
        assert!(mask.has(DataSource::Exac));
        assert!(!mask.has(DataSource::Evs));
        assert_eq!(mask.bits(), 0b1001);
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![DataSource::DbSnp, DataSource::Exac]
        );

        mask.remove(DataSource::DbSnp);
        assert_eq!(mask.bits(), 0b1000);
    }

    #[test]
    fn mask_unknown_bits() {
        let mask = SourceMask::from_bits(0b1010_0011);
        assert_eq!(mask.unknown_bits(), 0b1010_0000);
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![DataSource::DbSnp, DataSource::OneKg]
        );
    }

    #[test]
    fn names() -> Result<(), anyhow::Error> {
        assert_eq!(DataSource::OneKg.to_string(), "onekg");
        assert_eq!("dbsnp".parse::<DataSource>()?, DataSource::DbSnp);

        Ok(())
    }
}
