//! JSON-friendly views of stored records.

use std::collections::BTreeMap;
use std::fmt::Display;

use enum_map::{EnumArray, EnumMap};
use serde::Serialize;

use crate::sa::alleles::reverse_reduced_allele;
use crate::sa::items::{ClinVarItem, CosmicItem, CustomItem, ItemList, ListItem};
use crate::sa::position::PositionRecord;
use crate::sa::records::{AlleleCounts, SourceRecord};
use crate::sa::slot::AlleleSlot;
use crate::sa::sources::DataSource;

/// Allele count, total, and frequency of one population.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PopulationFrequency {
    pub count: u32,
    pub total: u32,
    pub frequency: Option<f64>,
}

impl From<AlleleCounts> for PopulationFrequency {
    fn from(counts: AlleleCounts) -> Self {
        Self {
            count: counts.count,
            total: counts.total,
            frequency: counts.frequency(),
        }
    }
}

fn population_view<P>(
    populations: &EnumMap<P, Option<AlleleCounts>>,
) -> BTreeMap<String, PopulationFrequency>
where
    P: EnumArray<Option<AlleleCounts>> + Display,
{
    populations
        .iter()
        .filter_map(|(population, counts)| {
            counts.map(|counts| (population.to_string(), counts.into()))
        })
        .collect()
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct OneKgView {
    pub ancestral_allele: Option<String>,
    pub populations: BTreeMap<String, PopulationFrequency>,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct EvsView {
    pub coverage: Option<i32>,
    pub num_samples: Option<i32>,
    pub populations: BTreeMap<String, PopulationFrequency>,
}

#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ExacView {
    pub coverage: Option<i32>,
    pub populations: BTreeMap<String, PopulationFrequency>,
}

/// A list item of the position together with whether it is about the queried allele.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScopedItem<T> {
    #[serde(flatten)]
    pub item: T,
    pub is_allele_specific: bool,
}

/// Position-wide fields.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct PositionSummary {
    pub chrom: String,
    pub position: i32,
    pub ref_allele: Option<String>,
    pub global_major_allele: Option<String>,
    pub global_major_allele_frequency: Option<String>,
    pub global_minor_allele: Option<String>,
    pub global_minor_allele_frequency: Option<String>,
    pub is_ref_minor: bool,
    /// Custom items not tied to an allele.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<CustomItem>,
}

/// Non-conflicted facts about one alternate allele.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct AlleleFacts {
    /// Canonical alternate allele.
    pub alt_allele: String,
    /// Alternate allele with the canonical markers removed.
    pub vcf_alt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dbsnp_ids: Vec<i64>,
    pub onekg: Option<OneKgView>,
    pub evs: Option<EvsView>,
    pub exac: Option<ExacView>,
    /// All ClinVar entries of the position.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clinvar: Vec<ScopedItem<ClinVarItem>>,
    /// All COSMIC entries of the position.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cosmic: Vec<ScopedItem<CosmicItem>>,
    /// Custom entries about this allele; positional ones are in the summary.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<CustomItem>,
}

impl AlleleFacts {
    fn new(alt_allele: &str) -> Self {
        Self {
            alt_allele: alt_allele.to_string(),
            vcf_alt: reverse_reduced_allele(alt_allele),
            ..Default::default()
        }
    }

    fn add_slot(&mut self, slot: &AlleleSlot) {
        for source in DataSource::all() {
            match slot.visible_record(source) {
                Some(SourceRecord::DbSnp(record)) => {
                    self.dbsnp_ids = record.ids.iter().copied().collect()
                }
                Some(SourceRecord::OneKg(record)) => {
                    self.onekg = Some(OneKgView {
                        ancestral_allele: record.ancestral_allele.clone(),
                        populations: population_view(&record.populations),
                    })
                }
                Some(SourceRecord::Evs(record)) => {
                    self.evs = Some(EvsView {
                        coverage: record.coverage,
                        num_samples: record.num_samples,
                        populations: population_view(&record.populations),
                    })
                }
                Some(SourceRecord::Exac(record)) => {
                    self.exac = Some(ExacView {
                        coverage: record.coverage,
                        populations: population_view(&record.populations),
                    })
                }
                None => (),
            }
        }
    }
}

/// Merged view of one allele together with the position-wide fields.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AlleleAnnotation {
    #[serde(flatten)]
    pub position: PositionSummary,
    #[serde(flatten)]
    pub facts: AlleleFacts,
}

/// View of a whole position record, as dumped.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PositionAnnotation {
    #[serde(flatten)]
    pub position: PositionSummary,
    pub alleles: Vec<AlleleFacts>,
}

fn scoped<T: ListItem>(items: &ItemList<T>, alt_allele: &str) -> Vec<ScopedItem<T>> {
    items
        .iter()
        .map(|item| ScopedItem {
            is_allele_specific: item.alt_allele() == Some(alt_allele),
            item: item.clone(),
        })
        .collect()
}

impl PositionRecord {
    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            chrom: self.chrom.clone(),
            position: self.position,
            ref_allele: self.ref_allele.clone(),
            global_major_allele: self.global_major_allele.clone(),
            global_major_allele_frequency: self.global_major_allele_frequency.clone(),
            global_minor_allele: self.global_minor_allele.clone(),
            global_minor_allele_frequency: self.global_minor_allele_frequency.clone(),
            is_ref_minor: self.is_ref_minor,
            positional: self
                .custom
                .iter()
                .filter(|item| item.alt_allele().is_none())
                .cloned()
                .collect(),
        }
    }

    /// Facts about the canonical alternate allele `alt_allele`, if any are stored.
    pub fn allele_facts(&self, alt_allele: &str) -> Option<AlleleFacts> {
        if !self.allele_keys().contains(alt_allele) {
            return None;
        }
        let mut facts = AlleleFacts::new(alt_allele);
        if let Some(slot) = self.slot(alt_allele) {
            facts.add_slot(slot);
        }
        facts.clinvar = scoped(&self.clinvar, alt_allele);
        facts.cosmic = scoped(&self.cosmic, alt_allele);
        facts.custom = self
            .custom
            .iter()
            .filter(|item| item.alt_allele() == Some(alt_allele))
            .cloned()
            .collect();
        Some(facts)
    }

    /// Merged view of `alt_allele` plus the position-wide fields.
    pub fn allele_annotation(&self, alt_allele: &str) -> Option<AlleleAnnotation> {
        self.allele_facts(alt_allele).map(|facts| AlleleAnnotation {
            position: self.summary(),
            facts,
        })
    }

    pub fn annotation(&self) -> PositionAnnotation {
        PositionAnnotation {
            position: self.summary(),
            alleles: self
                .allele_keys()
                .iter()
                .filter_map(|alt_allele| self.allele_facts(alt_allele))
                .collect(),
        }
    }
}
