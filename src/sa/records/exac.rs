//! ExAC allele frequencies.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::err::SaError;
use crate::sa::legacy::{AlleleSpecificId, TaggedRecord, TaggedValue};
use crate::sa::sources::DataSource;

use super::{
    populations_to_tagged, skip_unknown_field, AlleleCounts, AnnotationRecord,
    PopulationCollector,
};

/// ExAC populations.
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
pub enum ExacPopulation {
    All,
    Afr,
    Amr,
    Eas,
    Fin,
    Nfe,
    Oth,
    Sas,
}

impl ExacPopulation {
    fn field_ids(self) -> (u8, u8) {
        use AlleleSpecificId::*;
        let (an, ac) = match self {
            ExacPopulation::All => (ExacAllAn, ExacAllAc),
            ExacPopulation::Afr => (ExacAfrAn, ExacAfrAc),
            ExacPopulation::Amr => (ExacAmrAn, ExacAmrAc),
            ExacPopulation::Eas => (ExacEasAn, ExacEasAc),
            ExacPopulation::Fin => (ExacFinAn, ExacFinAc),
            ExacPopulation::Nfe => (ExacNfeAn, ExacNfeAc),
            ExacPopulation::Oth => (ExacOthAn, ExacOthAc),
            ExacPopulation::Sas => (ExacSasAn, ExacSasAc),
        };
        (an as u8, ac as u8)
    }

    /// Inverse of `field_ids`: the population and whether the id is the AN field.
    fn from_field_id(id: AlleleSpecificId) -> Option<(Self, bool)> {
        use strum::IntoEnumIterator;
        ExacPopulation::iter().find_map(|population| {
            let (an, ac) = population.field_ids();
            if id as u8 == an {
                Some((population, true))
            } else if id as u8 == ac {
                Some((population, false))
            } else {
                None
            }
        })
    }
}

/// ExAC record of one allele.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExacRecord {
    /// Mean coverage at the position.
    pub coverage: Option<i32>,
    pub populations: EnumMap<ExacPopulation, Option<AlleleCounts>>,
    conflicted: bool,
}

impl ExacRecord {
    pub fn new(
        coverage: Option<i32>,
        populations: EnumMap<ExacPopulation, Option<AlleleCounts>>,
    ) -> Self {
        Self {
            coverage,
            populations,
            conflicted: false,
        }
    }

    pub(crate) fn to_tagged(&self) -> Result<Vec<TaggedRecord>, SaError> {
        let mut fields = Vec::new();
        if let Some(coverage) = self.coverage {
            fields.push(AlleleSpecificId::ExacCoverage.tagged(TaggedValue::Int32(coverage))?);
        }
        populations_to_tagged(&self.populations, ExacPopulation::field_ids, &mut fields)?;
        Ok(fields)
    }

    pub(crate) fn from_tagged(fields: Vec<TaggedRecord>) -> Result<Self, SaError> {
        let mut coverage = None;
        let mut collector = PopulationCollector::<ExacPopulation>::new();
        for field in fields {
            match AlleleSpecificId::from_repr(field.id()) {
                Some(AlleleSpecificId::ExacCoverage) => coverage = Some(field.as_int32()?),
                Some(id) => match ExacPopulation::from_field_id(id) {
                    Some((population, true)) => collector.set_total(population, &field)?,
                    Some((population, false)) => collector.set_count(population, &field)?,
                    None => skip_unknown_field(DataSource::Exac, &field),
                },
                None => skip_unknown_field(DataSource::Exac, &field),
            }
        }
        Ok(Self::new(coverage, collector.finish()?))
    }
}

impl AnnotationRecord for ExacRecord {
    fn has_data(&self) -> bool {
        self.coverage.is_some() || self.populations.values().any(Option::is_some)
    }

    fn clear(&mut self) {
        self.coverage = None;
        self.populations = EnumMap::default();
    }

    fn has_conflicts(&self) -> bool {
        self.conflicted
    }

    fn set_conflicts(&mut self) {
        self.conflicted = true;
    }
}
