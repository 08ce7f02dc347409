//! Position-scoped list items: ClinVar, COSMIC and custom annotations.
//!
//! Items are deduplicated by an identity key.  Two items with the same key
//! are merged by unioning their set-valued fields; a scalar present on both
//! sides with different values resolves to the smaller one, so merges do not
//! depend on load order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::io::{Read, Write};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::err::SaError;
use crate::sa::codec::{self, Decode, Encode};

/// Item kinds that live in an `ItemList`.
pub trait ListItem: Clone + Debug + PartialEq + Encode + Decode {
    type Key: Ord + Clone + Debug + PartialEq;

    fn key(&self) -> Self::Key;

    /// Alternate allele the item refers to, `None` for position-wide items.
    fn alt_allele(&self) -> Option<&str>;

    /// Merge an item with the same key into `self`.
    fn merge_from(&mut self, other: &Self);
}

/// Keep the smaller of two present values.
fn merge_scalar<T: Ord + Clone>(lhs: &mut Option<T>, rhs: &Option<T>) {
    match (lhs.as_ref(), rhs) {
        (None, Some(_)) => *lhs = rhs.clone(),
        (Some(l), Some(r)) if r < l => *lhs = rhs.clone(),
        _ => (),
    }
}

fn write_opt_string<W: Write>(writer: &mut W, value: &Option<String>) -> Result<(), SaError> {
    codec::write_opt_text(writer, value.as_deref())
}

/// Review status of a ClinVar record.
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
pub enum ReviewStatus {
    NoAssertion = 0,
    NoCriteria = 1,
    PracticeGuideline = 2,
    SingleSubmitter = 3,
    MultipleSubmitters = 4,
    ConflictingInterpretations = 5,
    ExpertPanel = 6,
}

/// One ClinVar assertion about an allele at the position.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ClinVarItem {
    /// Accession, e.g., `RCV000012345.6`.
    pub id: String,
    /// Canonical alternate allele.
    #[serde(default)]
    pub alt_allele: String,
    pub reference_allele: Option<String>,
    pub allele_origin: Option<String>,
    pub gene_reviews_id: Option<String>,
    pub review_status: Option<ReviewStatus>,
    pub medgen_id: Option<String>,
    pub omim_id: Option<String>,
    pub orphanet_id: Option<String>,
    pub snomed_ct_id: Option<String>,
    pub phenotype: Option<String>,
    pub significance: Option<String>,
    pub last_evaluated: Option<NaiveDate>,
    #[serde(default)]
    pub pubmed_ids: BTreeSet<i64>,
}

impl ListItem for ClinVarItem {
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.id.clone(), self.alt_allele.clone())
    }

    fn alt_allele(&self) -> Option<&str> {
        Some(&self.alt_allele)
    }

    fn merge_from(&mut self, other: &Self) {
        merge_scalar(&mut self.reference_allele, &other.reference_allele);
        merge_scalar(&mut self.allele_origin, &other.allele_origin);
        merge_scalar(&mut self.gene_reviews_id, &other.gene_reviews_id);
        merge_scalar(&mut self.review_status, &other.review_status);
        merge_scalar(&mut self.medgen_id, &other.medgen_id);
        merge_scalar(&mut self.omim_id, &other.omim_id);
        merge_scalar(&mut self.orphanet_id, &other.orphanet_id);
        merge_scalar(&mut self.snomed_ct_id, &other.snomed_ct_id);
        merge_scalar(&mut self.phenotype, &other.phenotype);
        merge_scalar(&mut self.significance, &other.significance);
        merge_scalar(&mut self.last_evaluated, &other.last_evaluated);
        self.pubmed_ids.extend(other.pubmed_ids.iter().copied());
    }
}

impl Encode for ClinVarItem {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.id)?;
        codec::write_text(writer, &self.alt_allele)?;
        write_opt_string(writer, &self.reference_allele)?;
        write_opt_string(writer, &self.allele_origin)?;
        write_opt_string(writer, &self.gene_reviews_id)?;
        codec::write_opt_i32(writer, self.review_status.map(|status| status as i32))?;
        write_opt_string(writer, &self.medgen_id)?;
        write_opt_string(writer, &self.omim_id)?;
        write_opt_string(writer, &self.orphanet_id)?;
        write_opt_string(writer, &self.snomed_ct_id)?;
        write_opt_string(writer, &self.phenotype)?;
        write_opt_string(writer, &self.significance)?;
        codec::write_opt_i32(writer, self.last_evaluated.map(|date| date.num_days_from_ce()))?;
        codec::write_len(writer, self.pubmed_ids.len())?;
        for pubmed_id in &self.pubmed_ids {
            codec::write_i64(writer, *pubmed_id)?;
        }
        Ok(())
    }
}

impl Decode for ClinVarItem {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let id = codec::read_text(reader)?;
        let alt_allele = codec::read_text(reader)?;
        let reference_allele = codec::read_opt_text(reader)?;
        let allele_origin = codec::read_opt_text(reader)?;
        let gene_reviews_id = codec::read_opt_text(reader)?;
        let review_status = codec::read_opt_i32(reader)?
            .map(|value| {
                u8::try_from(value)
                    .ok()
                    .and_then(ReviewStatus::from_repr)
                    .ok_or_else(|| {
                        SaError::MalformedRecord(format!("invalid review status {}", value))
                    })
            })
            .transpose()?;
        let medgen_id = codec::read_opt_text(reader)?;
        let omim_id = codec::read_opt_text(reader)?;
        let orphanet_id = codec::read_opt_text(reader)?;
        let snomed_ct_id = codec::read_opt_text(reader)?;
        let phenotype = codec::read_opt_text(reader)?;
        let significance = codec::read_opt_text(reader)?;
        let last_evaluated = codec::read_opt_i32(reader)?
            .map(|days| {
                NaiveDate::from_num_days_from_ce_opt(days).ok_or_else(|| {
                    SaError::MalformedRecord(format!("invalid day number {}", days))
                })
            })
            .transpose()?;
        let mut pubmed_ids = BTreeSet::new();
        for _ in 0..codec::read_len(reader)? {
            pubmed_ids.insert(codec::read_i64(reader)?);
        }
        Ok(Self {
            id,
            alt_allele,
            reference_allele,
            allele_origin,
            gene_reviews_id,
            review_status,
            medgen_id,
            omim_id,
            orphanet_id,
            snomed_ct_id,
            phenotype,
            significance,
            last_evaluated,
            pubmed_ids,
        })
    }
}

/// A COSMIC study reporting a somatic mutation.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CosmicStudy {
    pub id: String,
    pub histology: Option<String>,
    pub primary_site: Option<String>,
}

/// One COSMIC somatic mutation entry.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CosmicItem {
    /// COSMIC id, e.g., `COSM12345`.
    pub id: String,
    #[serde(default)]
    pub alt_allele: String,
    pub ref_allele: Option<String>,
    pub gene: Option<String>,
    #[serde(default)]
    pub studies: BTreeSet<CosmicStudy>,
}

impl ListItem for CosmicItem {
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.id.clone(), self.alt_allele.clone())
    }

    fn alt_allele(&self) -> Option<&str> {
        Some(&self.alt_allele)
    }

    fn merge_from(&mut self, other: &Self) {
        merge_scalar(&mut self.ref_allele, &other.ref_allele);
        merge_scalar(&mut self.gene, &other.gene);
        self.studies.extend(other.studies.iter().cloned());
    }
}

impl Encode for CosmicItem {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.id)?;
        codec::write_text(writer, &self.alt_allele)?;
        write_opt_string(writer, &self.ref_allele)?;
        write_opt_string(writer, &self.gene)?;
        codec::write_len(writer, self.studies.len())?;
        for study in &self.studies {
            codec::write_text(writer, &study.id)?;
            write_opt_string(writer, &study.histology)?;
            write_opt_string(writer, &study.primary_site)?;
        }
        Ok(())
    }
}

impl Decode for CosmicItem {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let id = codec::read_text(reader)?;
        let alt_allele = codec::read_text(reader)?;
        let ref_allele = codec::read_opt_text(reader)?;
        let gene = codec::read_opt_text(reader)?;
        let mut studies = BTreeSet::new();
        for _ in 0..codec::read_len(reader)? {
            studies.insert(CosmicStudy {
                id: codec::read_text(reader)?,
                histology: codec::read_opt_text(reader)?,
                primary_site: codec::read_opt_text(reader)?,
            });
        }
        Ok(Self {
            id,
            alt_allele,
            ref_allele,
            gene,
            studies,
        })
    }
}

/// Entry of a user-supplied annotation source.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CustomItem {
    /// Name of the custom annotation source.
    pub annotation_type: String,
    pub id: Option<String>,
    /// Canonical alternate allele, absent for positional entries.
    pub alt_allele: Option<String>,
    #[serde(default)]
    pub is_positional: bool,
    #[serde(default)]
    pub string_fields: BTreeMap<String, String>,
    /// Names of flags that are set.
    #[serde(default)]
    pub boolean_fields: BTreeSet<String>,
}

impl ListItem for CustomItem {
    type Key = (String, Option<String>, Option<String>);

    fn key(&self) -> Self::Key {
        (
            self.annotation_type.clone(),
            self.id.clone(),
            self.alt_allele.clone(),
        )
    }

    fn alt_allele(&self) -> Option<&str> {
        self.alt_allele.as_deref()
    }

    fn merge_from(&mut self, other: &Self) {
        self.is_positional |= other.is_positional;
        for (key, value) in &other.string_fields {
            let mut merged = self.string_fields.get(key).cloned();
            merge_scalar(&mut merged, &Some(value.clone()));
            if let Some(merged) = merged {
                self.string_fields.insert(key.clone(), merged);
            }
        }
        self.boolean_fields.extend(other.boolean_fields.iter().cloned());
    }
}

impl Encode for CustomItem {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_text(writer, &self.annotation_type)?;
        write_opt_string(writer, &self.id)?;
        write_opt_string(writer, &self.alt_allele)?;
        codec::write_bool(writer, self.is_positional)?;
        codec::write_len(writer, self.string_fields.len())?;
        for (key, value) in &self.string_fields {
            codec::write_text(writer, key)?;
            codec::write_text(writer, value)?;
        }
        codec::write_len(writer, self.boolean_fields.len())?;
        for key in &self.boolean_fields {
            codec::write_text(writer, key)?;
        }
        Ok(())
    }
}

impl Decode for CustomItem {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let annotation_type = codec::read_text(reader)?;
        let id = codec::read_opt_text(reader)?;
        let alt_allele = codec::read_opt_text(reader)?;
        let is_positional = codec::read_bool(reader)?;
        let mut string_fields = BTreeMap::new();
        for _ in 0..codec::read_len(reader)? {
            let key = codec::read_text(reader)?;
            string_fields.insert(key, codec::read_text(reader)?);
        }
        let mut boolean_fields = BTreeSet::new();
        for _ in 0..codec::read_len(reader)? {
            boolean_fields.insert(codec::read_text(reader)?);
        }
        Ok(Self {
            annotation_type,
            id,
            alt_allele,
            is_positional,
            string_fields,
            boolean_fields,
        })
    }
}

/// Items of one kind, deduplicated by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemList<T: ListItem> {
    items: BTreeMap<T::Key, T>,
}

impl<T: ListItem> Default for ItemList<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: ListItem> ItemList<T> {
    /// Insert `item`, merging it into an item with the same key.
    ///
    /// Returns `true` if an existing item was merged.
    pub fn insert_or_merge(&mut self, item: T) -> bool {
        match self.items.get_mut(&item.key()) {
            Some(present) => {
                present.merge_from(&item);
                true
            }
            None => {
                self.items.insert(item.key(), item);
                false
            }
        }
    }

    /// Merge all items of `other`; returns the (merged, added) counts.
    pub fn merge(&mut self, other: &ItemList<T>) -> (usize, usize) {
        let mut merged = 0;
        for item in other.iter() {
            if self.insert_or_merge(item.clone()) {
                merged += 1;
            }
        }
        (merged, other.len() - merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: ListItem> Encode for ItemList<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        codec::write_len(writer, self.items.len())?;
        for item in self.items.values() {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: ListItem> Decode for ItemList<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let mut result = Self::default();
        for _ in 0..codec::read_len(reader)? {
            result.insert_or_merge(T::decode(reader)?);
        }
        Ok(result)
    }
}
