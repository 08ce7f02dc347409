//! Accumulation of input items into position records.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::common::{build_chrom_map, CHROMS};
use crate::err::SaError;
use crate::sa::alleles::canonicalize;
use crate::sa::intervals::SupplementaryInterval;
use crate::sa::items::{ClinVarItem, CosmicItem, CustomItem};
use crate::sa::position::PositionRecord;
use crate::sa::records::{MergeCounters, SourceRecord};

/// Source-specific content of an input item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload {
    Allele(SourceRecord),
    ClinVar(ClinVarItem),
    Cosmic(CosmicItem),
    Custom(CustomItem),
}

/// One allele-level input item, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementaryItem {
    pub chrom: String,
    /// 1-based start position.
    pub start: i32,
    pub reference: String,
    pub alternate: String,
    pub payload: ItemPayload,
}

/// Position records of one load, ordered by chromosome index and position.
#[derive(Debug, Clone)]
pub struct PositionMap {
    chrom_map: IndexMap<String, usize>,
    positions: BTreeMap<(usize, i32), PositionRecord>,
    intervals: Vec<SupplementaryInterval>,
    counters: MergeCounters,
}

impl Default for PositionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionMap {
    pub fn new() -> Self {
        Self {
            chrom_map: build_chrom_map(),
            positions: BTreeMap::new(),
            intervals: Vec::new(),
            counters: MergeCounters::default(),
        }
    }

    fn chrom_no(&self, chrom: &str) -> Result<usize, SaError> {
        self.chrom_map
            .get(chrom)
            .copied()
            .ok_or_else(|| SaError::UnknownChromosome(chrom.to_string()))
    }

    fn position_mut(&mut self, chrom_no: usize, position: i32) -> &mut PositionRecord {
        self.positions
            .entry((chrom_no, position))
            .or_insert_with(|| PositionRecord::new(CHROMS[chrom_no], position))
    }

    /// Canonicalize the allele of `item` and route it to its position.
    ///
    /// Errors concern this item only; the map is left unchanged.
    pub fn add_item(&mut self, item: SupplementaryItem) -> Result<(), SaError> {
        let chrom_no = self.chrom_no(&item.chrom)?;

        // positional custom items are not tied to an allele
        if let ItemPayload::Custom(custom) = &item.payload {
            if custom.is_positional || custom.alt_allele.is_none() {
                let mut custom = custom.clone();
                custom.alt_allele = None;
                let merged = self.position_mut(chrom_no, item.start).add_custom(custom);
                self.record_item(merged);
                return Ok(());
            }
        }

        let allele = canonicalize(item.start, &item.reference, &item.alternate)?;
        match item.payload {
            ItemPayload::Allele(record) => {
                let outcome = self
                    .position_mut(chrom_no, allele.start)
                    .add_allele_record(&allele, record)?;
                self.counters.record(outcome);
            }
            ItemPayload::ClinVar(mut clinvar) => {
                clinvar.alt_allele = allele.alternate.clone();
                let merged = self.position_mut(chrom_no, allele.start).add_clinvar(clinvar);
                self.record_item(merged);
            }
            ItemPayload::Cosmic(mut cosmic) => {
                cosmic.alt_allele = allele.alternate.clone();
                let merged = self.position_mut(chrom_no, allele.start).add_cosmic(cosmic);
                self.record_item(merged);
            }
            ItemPayload::Custom(mut custom) => {
                custom.alt_allele = Some(allele.alternate.clone());
                let merged = self.position_mut(chrom_no, allele.start).add_custom(custom);
                self.record_item(merged);
            }
        }
        Ok(())
    }

    fn record_item(&mut self, merged: bool) {
        if merged {
            self.counters.items_merged += 1;
        } else {
            self.counters.items_added += 1;
        }
    }

    /// Add an interval, normalizing its chromosome name.
    pub fn add_interval(&mut self, mut interval: SupplementaryInterval) -> Result<(), SaError> {
        let chrom_no = self.chrom_no(&interval.chrom)?;
        if interval.end < interval.start || interval.end == i32::MAX {
            return Err(SaError::MalformedRecord(format!(
                "invalid interval {}:{}-{}",
                interval.chrom, interval.start, interval.end
            )));
        }
        interval.chrom = CHROMS[chrom_no].to_string();
        self.intervals.push(interval);
        Ok(())
    }

    /// Merge the records of another load into `self`.
    pub fn merge(&mut self, other: PositionMap) -> Result<(), SaError> {
        self.counters += other.counters;
        for (key, record) in other.positions {
            match self.positions.entry(key) {
                Entry::Occupied(mut entry) => {
                    let counters = entry.get_mut().merge(&record)?;
                    self.counters += counters;
                }
                Entry::Vacant(entry) => {
                    entry.insert(record);
                }
            }
        }
        self.intervals.extend(other.intervals);
        Ok(())
    }

    /// Compute the derived fields of all positions and order the intervals.
    pub fn finalize(&mut self) {
        self.positions.values_mut().for_each(PositionRecord::finalize);
        let chrom_map = &self.chrom_map;
        self.intervals.sort_by(|lhs, rhs| {
            (chrom_map.get(&lhs.chrom), lhs.start, lhs.end, &lhs.source)
                .cmp(&(chrom_map.get(&rhs.chrom), rhs.start, rhs.end, &rhs.source))
        });
    }

    pub fn counters(&self) -> &MergeCounters {
        &self.counters
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, chrom: &str, position: i32) -> Option<&PositionRecord> {
        let chrom_no = self.chrom_map.get(chrom)?;
        self.positions.get(&(*chrom_no, position))
    }

    /// Positions in store order.
    pub fn positions(&self) -> impl Iterator<Item = &PositionRecord> {
        self.positions.values()
    }

    pub fn intervals(&self) -> &[SupplementaryInterval] {
        &self.intervals
    }
}
