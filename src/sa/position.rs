//! Position records: everything known about one genomic position.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use crate::err::SaError;
use crate::sa::alleles::CanonicalAllele;
use crate::sa::codec::{self, Decode, Encode};
use crate::sa::frequency::{
    allele_frequencies, format_frequency, global_alleles, is_reference_minor,
};
use crate::sa::items::{ClinVarItem, CosmicItem, CustomItem, ItemList, ListItem};
use crate::sa::legacy::{read_tagged, write_tagged, PositionalId, TaggedRecord, TaggedValue};
use crate::sa::records::{MergeCounters, MergeOutcome, SourceRecord};
use crate::sa::slot::AlleleSlot;

/// Annotations of one (chromosome, position).
///
/// Allele keys are canonical alternate alleles.  The global allele fields
/// and the reference-minor flag are derived by `finalize`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionRecord {
    /// Canonical chromosome name.
    pub chrom: String,
    /// 1-based position.
    pub position: i32,
    /// Reference base at the position, if known.
    pub ref_allele: Option<String>,
    pub global_major_allele: Option<String>,
    pub global_major_allele_frequency: Option<String>,
    pub global_minor_allele: Option<String>,
    pub global_minor_allele_frequency: Option<String>,
    pub is_ref_minor: bool,
    alleles: BTreeMap<String, AlleleSlot>,
    pub clinvar: ItemList<ClinVarItem>,
    pub cosmic: ItemList<CosmicItem>,
    pub custom: ItemList<CustomItem>,
}

impl PositionRecord {
    pub fn new(chrom: &str, position: i32) -> Self {
        Self {
            chrom: chrom.to_string(),
            position,
            ..Default::default()
        }
    }

    fn check_position(&self, allele: &CanonicalAllele) -> Result<(), SaError> {
        if allele.start != self.position {
            return Err(SaError::PositionMismatch {
                expected: format!("{}:{}", self.chrom, self.position),
                actual: format!("{}:{}", self.chrom, allele.start),
            });
        }
        Ok(())
    }

    /// Record the reference base; on disagreement, the smaller base wins.
    fn merge_ref_allele(&mut self, ref_allele: Option<&str>) {
        match (self.ref_allele.as_deref(), ref_allele) {
            (None, Some(new)) => self.ref_allele = Some(new.to_string()),
            (Some(present), Some(new)) if present != new => {
                tracing::warn!(
                    "reference base mismatch at {}:{}: {} vs. {}",
                    self.chrom,
                    self.position,
                    present,
                    new
                );
                if new < present {
                    self.ref_allele = Some(new.to_string());
                }
            }
            _ => (),
        }
    }

    /// Add the record of one source for a canonical allele.
    pub fn add_allele_record(
        &mut self,
        allele: &CanonicalAllele,
        record: SourceRecord,
    ) -> Result<MergeOutcome, SaError> {
        self.check_position(allele)?;
        // the first reference base is the base at the position
        self.merge_ref_allele(allele.reference.get(..1));
        self.alleles
            .entry(allele.alternate.clone())
            .or_default()
            .add_or_merge_record(record)
    }

    /// Add a ClinVar item; returns `true` if it merged into an existing item.
    pub fn add_clinvar(&mut self, item: ClinVarItem) -> bool {
        self.clinvar.insert_or_merge(item)
    }

    pub fn add_cosmic(&mut self, item: CosmicItem) -> bool {
        self.cosmic.insert_or_merge(item)
    }

    pub fn add_custom(&mut self, item: CustomItem) -> bool {
        self.custom.insert_or_merge(item)
    }

    pub fn slot(&self, alt_allele: &str) -> Option<&AlleleSlot> {
        self.alleles.get(alt_allele)
    }

    /// Slots with at least one non-conflicted source, ordered by alternate allele.
    ///
    /// Slots holding only conflicted records are kept in memory for merging
    /// but are neither written nor reported.
    fn visible_slots(&self) -> impl Iterator<Item = (&String, &AlleleSlot)> {
        self.alleles
            .iter()
            .filter(|(_, slot)| !slot.written_mask().is_empty())
    }

    /// Alternate alleles with a visible slot or an allele-specific list item.
    pub fn allele_keys(&self) -> BTreeSet<String> {
        let mut keys = self
            .visible_slots()
            .map(|(alt_allele, _)| alt_allele.clone())
            .collect::<BTreeSet<_>>();
        let item_alleles = self
            .clinvar
            .iter()
            .filter_map(ListItem::alt_allele)
            .chain(self.cosmic.iter().filter_map(ListItem::alt_allele))
            .chain(self.custom.iter().filter_map(ListItem::alt_allele));
        keys.extend(item_alleles.map(str::to_string));
        keys
    }

    /// Whether nothing would be visible after writing the record.
    pub fn is_empty(&self) -> bool {
        self.visible_slots().next().is_none()
            && self.clinvar.is_empty()
            && self.cosmic.is_empty()
            && self.custom.is_empty()
    }

    /// Merge another record of the same position and recompute derived fields.
    pub fn merge(&mut self, other: &PositionRecord) -> Result<MergeCounters, SaError> {
        if self.chrom != other.chrom || self.position != other.position {
            return Err(SaError::PositionMismatch {
                expected: format!("{}:{}", self.chrom, self.position),
                actual: format!("{}:{}", other.chrom, other.position),
            });
        }

        let mut counters = MergeCounters::default();
        self.merge_ref_allele(other.ref_allele.as_deref());
        for (alt_allele, other_slot) in &other.alleles {
            match self.alleles.get_mut(alt_allele) {
                Some(slot) => counters += slot.merge(other_slot)?,
                None => {
                    let mut slot = AlleleSlot::default();
                    counters += slot.merge(other_slot)?;
                    self.alleles.insert(alt_allele.clone(), slot);
                }
            }
        }
        for (merged, added) in [
            self.clinvar.merge(&other.clinvar),
            self.cosmic.merge(&other.cosmic),
            self.custom.merge(&other.custom),
        ] {
            counters.items_merged += merged;
            counters.items_added += added;
        }

        self.finalize();
        Ok(counters)
    }

    /// Recompute global major/minor alleles and the reference-minor flag.
    pub fn finalize(&mut self) {
        let frequencies = allele_frequencies(&self.alleles);
        let ref_allele = self.ref_allele.as_deref();
        let global = global_alleles(&frequencies, ref_allele);
        self.is_ref_minor = is_reference_minor(&frequencies, ref_allele);

        let (major, major_freq) = split(global.major);
        self.global_major_allele = major;
        self.global_major_allele_frequency = major_freq;
        let (minor, minor_freq) = split(global.minor);
        self.global_minor_allele = minor;
        self.global_minor_allele_frequency = minor_freq;
    }

    fn positional_tags(&self) -> Result<Vec<TaggedRecord>, SaError> {
        let text_fields = [
            (PositionalId::GlobalMinorAllele, &self.global_minor_allele),
            (
                PositionalId::GlobalMinorAlleleFrequency,
                &self.global_minor_allele_frequency,
            ),
            (PositionalId::GlobalMajorAllele, &self.global_major_allele),
            (
                PositionalId::GlobalMajorAlleleFrequency,
                &self.global_major_allele_frequency,
            ),
        ];
        let mut tags = Vec::new();
        for (id, value) in text_fields {
            if let Some(value) = value {
                tags.push(id.tagged(TaggedValue::Text(value.clone()))?);
            }
        }
        if self.is_ref_minor {
            tags.push(PositionalId::IsRefMinorAllele.tagged(TaggedValue::Boolean(true))?);
        }
        Ok(tags)
    }

    fn apply_positional_tags(&mut self, tags: Vec<TaggedRecord>) -> Result<(), SaError> {
        for tag in tags {
            match PositionalId::from_repr(tag.id()) {
                Some(PositionalId::GlobalMinorAllele) => {
                    self.global_minor_allele = Some(tag.as_text()?.to_string())
                }
                Some(PositionalId::GlobalMinorAlleleFrequency) => {
                    self.global_minor_allele_frequency = Some(tag.as_text()?.to_string())
                }
                Some(PositionalId::GlobalMajorAllele) => {
                    self.global_major_allele = Some(tag.as_text()?.to_string())
                }
                Some(PositionalId::GlobalMajorAlleleFrequency) => {
                    self.global_major_allele_frequency = Some(tag.as_text()?.to_string())
                }
                Some(PositionalId::IsRefMinorAllele) => self.is_ref_minor = tag.as_bool()?,
                None => tracing::warn!(
                    "skipping {}",
                    SaError::UnknownFieldId {
                        context: "positional",
                        id: tag.id()
                    }
                ),
            }
        }
        Ok(())
    }
}

fn split(value: Option<(String, f64)>) -> (Option<String>, Option<String>) {
    match value {
        Some((allele, frequency)) => (Some(allele), Some(format_frequency(frequency))),
        None => (None, None),
    }
}

impl Encode for PositionRecord {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.chrom)?;
        codec::write_i32(writer, self.position)?;
        codec::write_opt_text(writer, self.ref_allele.as_deref())?;
        write_tagged(writer, &self.positional_tags()?)?;
        let slots = self.visible_slots().collect::<Vec<_>>();
        codec::write_len(writer, slots.len())?;
        for (alt_allele, slot) in slots {
            codec::write_text(writer, alt_allele)?;
            slot.encode(writer)?;
        }
        self.clinvar.encode(writer)?;
        self.cosmic.encode(writer)?;
        self.custom.encode(writer)?;
        Ok(())
    }
}

impl Decode for PositionRecord {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let mut result = PositionRecord::new(&codec::read_text(reader)?, codec::read_i32(reader)?);
        result.ref_allele = codec::read_opt_text(reader)?;
        result.apply_positional_tags(read_tagged(reader)?)?;
        for _ in 0..codec::read_len(reader)? {
            let alt_allele = codec::read_text(reader)?;
            let slot = AlleleSlot::decode(reader)?;
            if result.alleles.insert(alt_allele.clone(), slot).is_some() {
                return Err(SaError::MalformedRecord(format!(
                    "duplicate allele {} at {}:{}",
                    alt_allele, result.chrom, result.position
                )));
            }
        }
        result.clinvar = ItemList::decode(reader)?;
        result.cosmic = ItemList::decode(reader)?;
        result.custom = ItemList::decode(reader)?;
        Ok(result)
    }
}
