//! Exome Variant Server allele frequencies.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::err::SaError;
use crate::sa::legacy::{AlleleSpecificId, TaggedRecord, TaggedValue};
use crate::sa::sources::DataSource;

use super::{count_from_i32, count_to_i32, skip_unknown_field, AlleleCounts, AnnotationRecord};

/// EVS populations.
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
pub enum EvsPopulation {
    All,
    Afr,
    Eur,
}

impl EvsPopulation {
    fn field_id(self) -> AlleleSpecificId {
        match self {
            EvsPopulation::All => AlleleSpecificId::EvsAll,
            EvsPopulation::Afr => AlleleSpecificId::EvsAfr,
            EvsPopulation::Eur => AlleleSpecificId::EvsEur,
        }
    }
}

/// EVS record of one allele.
///
/// Population counts are stored in a single field as `[count, total]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvsRecord {
    pub coverage: Option<i32>,
    pub num_samples: Option<i32>,
    pub populations: EnumMap<EvsPopulation, Option<AlleleCounts>>,
    conflicted: bool,
}

impl EvsRecord {
    pub fn new(
        coverage: Option<i32>,
        num_samples: Option<i32>,
        populations: EnumMap<EvsPopulation, Option<AlleleCounts>>,
    ) -> Self {
        Self {
            coverage,
            num_samples,
            populations,
            conflicted: false,
        }
    }

    pub(crate) fn to_tagged(&self) -> Result<Vec<TaggedRecord>, SaError> {
        let mut fields = Vec::new();
        if let Some(coverage) = self.coverage {
            fields.push(AlleleSpecificId::EvsCoverage.tagged(TaggedValue::Int32(coverage))?);
        }
        if let Some(num_samples) = self.num_samples {
            fields.push(AlleleSpecificId::NumEvsSamples.tagged(TaggedValue::Int32(num_samples))?);
        }
        for (population, counts) in self.populations.iter() {
            if let Some(counts) = counts {
                fields.push(population.field_id().tagged(TaggedValue::Int64List(vec![
                    count_to_i32(counts.count)? as i64,
                    count_to_i32(counts.total)? as i64,
                ]))?);
            }
        }
        Ok(fields)
    }

    pub(crate) fn from_tagged(fields: Vec<TaggedRecord>) -> Result<Self, SaError> {
        let mut result = Self::default();
        for field in fields {
            let population = match AlleleSpecificId::from_repr(field.id()) {
                Some(AlleleSpecificId::EvsCoverage) => {
                    result.coverage = Some(field.as_int32()?);
                    continue;
                }
                Some(AlleleSpecificId::NumEvsSamples) => {
                    result.num_samples = Some(field.as_int32()?);
                    continue;
                }
                Some(AlleleSpecificId::EvsAll) => EvsPopulation::All,
                Some(AlleleSpecificId::EvsAfr) => EvsPopulation::Afr,
                Some(AlleleSpecificId::EvsEur) => EvsPopulation::Eur,
                _ => {
                    skip_unknown_field(DataSource::Evs, &field);
                    continue;
                }
            };
            result.populations[population] = match field.as_int64_list()? {
                [count, total] => Some(AlleleCounts::new(
                    count_from_i64(*count)?,
                    count_from_i64(*total)?,
                )),
                other => {
                    return Err(SaError::MalformedRecord(format!(
                        "EVS {} counts must have two values, got {}",
                        population,
                        other.len()
                    )))
                }
            };
        }
        Ok(result)
    }
}

fn count_from_i64(value: i64) -> Result<u32, SaError> {
    let value = i32::try_from(value)
        .map_err(|_| SaError::MalformedRecord(format!("allele count {} out of range", value)))?;
    count_from_i32(value)
}

impl AnnotationRecord for EvsRecord {
    fn has_data(&self) -> bool {
        self.coverage.is_some()
            || self.num_samples.is_some()
            || self.populations.values().any(Option::is_some)
    }

    fn clear(&mut self) {
        self.coverage = None;
        self.num_samples = None;
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

    fn record(coverage: i32) -> EvsRecord {
        EvsRecord::new(
            Some(coverage),
            Some(6503),
            enum_map! {
                EvsPopulation::All => Some(AlleleCounts::new(5, 13006)),
                EvsPopulation::Afr => Some(AlleleCounts::new(5, 4406)),
                EvsPopulation::Eur => None,
            },
        )
    }

    #[test]
    fn tagged_fields() -> Result<(), anyhow::Error> {
        let original = record(60);
        let fields = original.to_tagged()?;

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[2].id(), AlleleSpecificId::EvsAll as u8);
        assert_eq!(fields[2].as_int64_list()?, &[5, 13006]);
        assert_eq!(EvsRecord::from_tagged(fields)?, original);

        Ok(())
    }

    #[test]
    fn conflict_is_absorbing() {
        let mut lhs = record(60);
        assert_eq!(lhs.merge_with(&record(61)), MergeOutcome::Conflicted);
        assert_eq!(lhs.merge_with(&record(60)), MergeOutcome::AlreadyConflicted);
        assert!(lhs.has_conflicts());
        assert!(!lhs.has_data());
    }

    #[test]
    fn wrong_count_arity() -> Result<(), anyhow::Error> {
        let fields = vec![AlleleSpecificId::EvsAfr.tagged(TaggedValue::Int64List(vec![1]))?];
        assert!(matches!(
            EvsRecord::from_tagged(fields),
            Err(SaError::MalformedRecord(_))
        ));

        Ok(())
    }
}
