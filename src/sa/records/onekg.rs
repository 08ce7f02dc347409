//! 1000 Genomes allele frequencies.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::err::SaError;
use crate::sa::legacy::{AlleleSpecificId, TaggedRecord, TaggedValue};
use crate::sa::sources::DataSource;

use super::{
    populations_to_tagged, skip_unknown_field, AlleleCounts, AnnotationRecord,
    PopulationCollector,
};

/// 1000 Genomes super populations.
#[derive(
    Serialize,
    Deserialize,
    enum_map::Enum,
    strum::EnumIter,
    strum::Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Debug,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OneKgPopulation {
    All,
    Afr,
    Amr,
    Eas,
    Eur,
    Sas,
}

impl OneKgPopulation {
    /// Ids of the allele number and allele count fields.
    fn field_ids(self) -> (u8, u8) {
        use AlleleSpecificId::*;
        let (an, ac) = match self {
            OneKgPopulation::All => (OneKgAllAn, OneKgAllAc),
            OneKgPopulation::Afr => (OneKgAfrAn, OneKgAfrAc),
            OneKgPopulation::Amr => (OneKgAmrAn, OneKgAmrAc),
            OneKgPopulation::Eas => (OneKgEasAn, OneKgEasAc),
            OneKgPopulation::Eur => (OneKgEurAn, OneKgEurAc),
            OneKgPopulation::Sas => (OneKgSasAn, OneKgSasAc),
        };
        (an as u8, ac as u8)
    }
}

/// 1000 Genomes record of one allele.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OneKgRecord {
    pub ancestral_allele: Option<String>,
    pub populations: EnumMap<OneKgPopulation, Option<AlleleCounts>>,
    conflicted: bool,
}

impl OneKgRecord {
    pub fn new(
        ancestral_allele: Option<String>,
        populations: EnumMap<OneKgPopulation, Option<AlleleCounts>>,
    ) -> Self {
        Self {
            ancestral_allele,
            populations,
            conflicted: false,
        }
    }

    pub(crate) fn to_tagged(&self) -> Result<Vec<TaggedRecord>, SaError> {
        let mut fields = Vec::new();
        if let Some(ancestral_allele) = &self.ancestral_allele {
            fields.push(
                AlleleSpecificId::AncestralAllele
                    .tagged(TaggedValue::Text(ancestral_allele.clone()))?,
            );
        }
        populations_to_tagged(&self.populations, OneKgPopulation::field_ids, &mut fields)?;
        Ok(fields)
    }

    pub(crate) fn from_tagged(fields: Vec<TaggedRecord>) -> Result<Self, SaError> {
        use AlleleSpecificId::*;
        use OneKgPopulation::*;

        let mut ancestral_allele = None;
        let mut collector = PopulationCollector::<OneKgPopulation>::new();
        for field in fields {
            match AlleleSpecificId::from_repr(field.id()) {
                Some(AncestralAllele) => ancestral_allele = Some(field.as_text()?.to_string()),
                Some(OneKgAllAn) => collector.set_total(All, &field)?,
                Some(OneKgAfrAn) => collector.set_total(Afr, &field)?,
                Some(OneKgAmrAn) => collector.set_total(Amr, &field)?,
                Some(OneKgEasAn) => collector.set_total(Eas, &field)?,
                Some(OneKgEurAn) => collector.set_total(Eur, &field)?,
                Some(OneKgSasAn) => collector.set_total(Sas, &field)?,
                Some(OneKgAllAc) => collector.set_count(All, &field)?,
                Some(OneKgAfrAc) => collector.set_count(Afr, &field)?,
                Some(OneKgAmrAc) => collector.set_count(Amr, &field)?,
                Some(OneKgEasAc) => collector.set_count(Eas, &field)?,
                Some(OneKgEurAc) => collector.set_count(Eur, &field)?,
                Some(OneKgSasAc) => collector.set_count(Sas, &field)?,
                _ => skip_unknown_field(DataSource::OneKg, &field),
            }
        }
        Ok(Self::new(ancestral_allele, collector.finish()?))
    }
}

impl AnnotationRecord for OneKgRecord {
    fn has_data(&self) -> bool {
        self.ancestral_allele.is_some() || self.populations.values().any(Option::is_some)
    }

    fn clear(&mut self) {
        self.ancestral_allele = None;
        self.populations = EnumMap::default();
    }

    fn has_conflicts(&self) -> bool {
        self.conflicted
    }

    fn set_conflicts(&mut self) {
        self.conflicted = true;
    }
}

#[cfg(test)]
mod test {
    use enum_map::enum_map;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sa::records::MergeOutcome;

    fn record(all: (u32, u32)) -> OneKgRecord {
        OneKgRecord::new(
            Some("A".into()),
            enum_map! {
                OneKgPopulation::All => Some(AlleleCounts::new(all.0, all.1)),
                OneKgPopulation::Eur => Some(AlleleCounts::new(1, 1006)),
                _ => None,
            },
        )
    }

    #[test]
    fn tagged_fields() -> Result<(), anyhow::Error> {
        let original = record((12, 5008));
        let fields = original.to_tagged()?;

        // ancestral allele plus AN/AC for two populations
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1].id(), AlleleSpecificId::OneKgAllAn as u8);
        assert_eq!(fields[1].as_int32()?, 5008);
        assert_eq!(OneKgRecord::from_tagged(fields)?, original);

        Ok(())
    }

    #[test]
    fn conflict_clears() {
        let mut lhs = record((12, 5008));
        let rhs = record((13, 5008));

        assert_eq!(lhs.merge_with(&rhs), MergeOutcome::Conflicted);
        assert!(lhs.has_conflicts());
        assert!(!lhs.has_data());
        assert_eq!(lhs.populations[OneKgPopulation::All], None);
    }

    #[test]
    fn merge_with_empty_keeps_data() {
        let mut lhs = record((12, 5008));
        let expected = lhs.clone();

        assert_eq!(
            lhs.merge_with(&OneKgRecord::default()),
            MergeOutcome::Unchanged
        );
        assert_eq!(lhs, expected);
        assert!(!lhs.has_conflicts());
    }

    #[test]
    fn identical_records_agree() {
        let mut lhs = record((12, 5008));

        assert_eq!(lhs.merge_with(&record((12, 5008))), MergeOutcome::Unchanged);
        assert!(lhs.has_data());
    }

    #[test]
    fn half_population_is_malformed() -> Result<(), anyhow::Error> {
        let fields = vec![AlleleSpecificId::OneKgAfrAn.tagged(TaggedValue::Int32(10))?];
        assert!(matches!(
            OneKgRecord::from_tagged(fields),
            Err(SaError::MalformedRecord(_))
        ));

        Ok(())
    }
}
