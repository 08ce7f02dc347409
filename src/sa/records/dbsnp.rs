//! dbSNP identifiers of an allele.

use std::collections::BTreeSet;

use crate::err::SaError;
use crate::sa::legacy::{AlleleSpecificId, TaggedRecord, TaggedValue};
use crate::sa::sources::DataSource;

use super::{skip_unknown_field, AnnotationRecord};

/// rs ids of one allele.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DbSnpRecord {
    pub ids: BTreeSet<i64>,
    conflicted: bool,
}

impl DbSnpRecord {
    pub fn from_ids<I: IntoIterator<Item = i64>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            conflicted: false,
        }
    }

    pub(crate) fn to_tagged(&self) -> Result<Vec<TaggedRecord>, SaError> {
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![AlleleSpecificId::DbSnp.tagged(TaggedValue::Int64List(
            self.ids.iter().copied().collect(),
        ))?])
    }

    pub(crate) fn from_tagged(fields: Vec<TaggedRecord>) -> Result<Self, SaError> {
        let mut result = Self::default();
        for field in fields {
            match AlleleSpecificId::from_repr(field.id()) {
                Some(AlleleSpecificId::DbSnp) => {
                    result.ids.extend(field.as_int64_list()?.iter().copied())
                }
                _ => skip_unknown_field(DataSource::DbSnp, &field),
            }
        }
        Ok(result)
    }
}

impl AnnotationRecord for DbSnpRecord {
    fn has_data(&self) -> bool {
        !self.ids.is_empty()
    }

    fn clear(&mut self) {
        self.ids.clear();
    }

    fn has_conflicts(&self) -> bool {
        self.conflicted
    }

    fn set_conflicts(&mut self) {
        self.conflicted = true;
    }

    /// An allele may carry several rs ids, so ids are unioned.
    fn combine(&mut self, other: &Self) -> bool {
        self.ids.extend(other.ids.iter().copied());
        true
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sa::records::MergeOutcome;

    #[test]
    fn ids_are_unioned() {
        let mut lhs = DbSnpRecord::from_ids([3118506]);
        let rhs = DbSnpRecord::from_ids([368645009]);

        assert_eq!(lhs.merge_with(&rhs), MergeOutcome::Combined);
        assert_eq!(
            lhs.ids.iter().copied().collect::<Vec<_>>(),
            vec![3118506, 368645009]
        );
        assert!(!lhs.has_conflicts());
    }

    #[test]
    fn empty_adopts() {
        let mut lhs = DbSnpRecord::default();
        let rhs = DbSnpRecord::from_ids([1, 2]);

        assert_eq!(lhs.merge_with(&rhs), MergeOutcome::Adopted);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn tagged_fields() -> Result<(), anyhow::Error> {
        let record = DbSnpRecord::from_ids([25, 7]);
        let fields = record.to_tagged()?;

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].as_int64_list()?, &[7, 25]);
        assert_eq!(DbSnpRecord::from_tagged(fields)?, record);

        Ok(())
    }
}
