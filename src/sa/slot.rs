//! Everything known about one alternate allele at one position.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use enum_map::EnumMap;

use crate::err::SaError;
use crate::sa::codec::{self, truncated, Decode, Encode};
use crate::sa::records::{MergeCounters, MergeOutcome, SourceRecord};
use crate::sa::sources::{DataSource, SourceMask};

/// Bitmask of present sources plus one optional record per source.
///
/// The bit of a source is set exactly when its record is populated.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AlleleSlot {
    mask: SourceMask,
    records: EnumMap<DataSource, Option<SourceRecord>>,
}

impl AlleleSlot {
    pub fn mask(&self) -> SourceMask {
        self.mask
    }

    pub fn has_source(&self, source: DataSource) -> bool {
        self.mask.has(source)
    }

    pub fn get_record(&self, source: DataSource) -> Option<&SourceRecord> {
        self.records[source].as_ref()
    }

    /// Records in ascending source order, conflicted ones included.
    pub fn records(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.values().flatten()
    }

    /// Non-conflicted record of `source`.
    pub fn visible_record(&self, source: DataSource) -> Option<&SourceRecord> {
        self.get_record(source).filter(|record| !record.has_conflicts())
    }

    /// Store `record` if its source is new, merge it into the present record otherwise.
    pub fn add_or_merge_record(&mut self, record: SourceRecord) -> Result<MergeOutcome, SaError> {
        let source = record.source();
        match &mut self.records[source] {
            Some(present) => present.merge_with(&record),
            empty => {
                let outcome = if record.has_conflicts() {
                    MergeOutcome::AlreadyConflicted
                } else {
                    MergeOutcome::Adopted
                };
                *empty = Some(record);
                self.mask.add(source);
                Ok(outcome)
            }
        }
    }

    /// Merge all records of `other` into `self`.
    pub fn merge(&mut self, other: &AlleleSlot) -> Result<MergeCounters, SaError> {
        let mut counters = MergeCounters::default();
        for record in other.records() {
            counters.record(self.add_or_merge_record(record.clone())?);
        }
        Ok(counters)
    }

    /// The mask as written: conflicted sources are dropped.
    pub fn written_mask(&self) -> SourceMask {
        let mut mask = self.mask;
        for record in self.records() {
            if record.has_conflicts() {
                mask.remove(record.source());
            }
        }
        mask
    }
}

impl Encode for AlleleSlot {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        let mask = self.written_mask();
        writer.write_u8(mask.bits())?;
        for source in mask.iter() {
            if let Some(record) = &self.records[source] {
                let payload = record.to_vec()?;
                codec::write_len(writer, payload.len())?;
                writer.write_all(&payload)?;
            }
        }
        Ok(())
    }
}

impl Decode for AlleleSlot {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let mask = SourceMask::from_bits(reader.read_u8().map_err(truncated("source mask"))?);
        let unknown = mask.unknown_bits();
        let mut result = AlleleSlot::default();
        for bit in 0..8u8 {
            if mask.bits() & (1 << bit) == 0 {
                continue;
            }
            let len = codec::read_len(reader)?;
            let mut payload = Vec::new();
            reader
                .by_ref()
                .take(len as u64)
                .read_to_end(&mut payload)?;
            if payload.len() != len {
                return Err(SaError::MalformedRecord(format!(
                    "truncated payload of source bit {}",
                    bit
                )));
            }
            if unknown & (1 << bit) != 0 {
                tracing::warn!("skipping {} bytes: {}", len, SaError::UnknownDataSource(bit));
                continue;
            }
            let source = DataSource::from_bit_index(bit)?;
            result.records[source] = Some(SourceRecord::from_slice_for(source, &payload)?);
            result.mask.add(source);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use enum_map::enum_map;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sa::records::{
        AlleleCounts, DbSnpRecord, EvsRecord, ExacPopulation, ExacRecord, OneKgRecord,
    };

    fn exac(count: u32) -> SourceRecord {
        SourceRecord::Exac(ExacRecord::new(
            None,
            enum_map! { ExacPopulation::All => Some(AlleleCounts::new(count, 1000)), _ => None },
        ))
    }

    #[test]
    fn empty_slot_is_one_byte() -> Result<(), anyhow::Error> {
        let slot = AlleleSlot::default();
        assert_eq!(slot.to_vec()?, vec![0x00]);
        assert_eq!(AlleleSlot::from_slice(&[0x00])?, slot);

        Ok(())
    }

    #[test]
    fn bit_tracks_record() -> Result<(), anyhow::Error> {
        let mut slot = AlleleSlot::default();
        assert!(!slot.has_source(DataSource::Exac));

        assert_eq!(slot.add_or_merge_record(exac(5))?, MergeOutcome::Adopted);
        assert!(slot.has_source(DataSource::Exac));
        assert!(slot.get_record(DataSource::Exac).is_some());
        assert!(slot.get_record(DataSource::Evs).is_none());

        assert_eq!(slot.add_or_merge_record(exac(6))?, MergeOutcome::Conflicted);
        // bit stays set, record is conflicted and hidden
        assert!(slot.has_source(DataSource::Exac));
        assert!(slot.visible_record(DataSource::Exac).is_none());
        assert_eq!(slot.written_mask(), SourceMask::empty());

        Ok(())
    }

    #[test]
    fn conflicted_sources_are_not_written() -> Result<(), anyhow::Error> {
        let mut slot = AlleleSlot::default();
        slot.add_or_merge_record(SourceRecord::DbSnp(DbSnpRecord::from_ids([42])))?;
        slot.add_or_merge_record(exac(5))?;
        slot.add_or_merge_record(exac(7))?;

        let buf = slot.to_vec()?;
        assert_eq!(buf[0], DataSource::DbSnp.bit());

        let decoded = AlleleSlot::from_slice(&buf)?;
        assert!(decoded.has_source(DataSource::DbSnp));
        assert!(!decoded.has_source(DataSource::Exac));
        assert_eq!(
            decoded.get_record(DataSource::DbSnp),
            slot.get_record(DataSource::DbSnp)
        );

        Ok(())
    }

    #[test]
    fn records_in_bit_order() -> Result<(), anyhow::Error> {
        let mut slot = AlleleSlot::default();
        slot.add_or_merge_record(exac(5))?;
        slot.add_or_merge_record(SourceRecord::Evs(EvsRecord::new(
            Some(10),
            None,
            Default::default(),
        )))?;
        slot.add_or_merge_record(SourceRecord::OneKg(OneKgRecord::new(
            Some("C".into()),
            Default::default(),
        )))?;

        assert_eq!(
            slot.records().map(|r| r.source()).collect::<Vec<_>>(),
            vec![DataSource::OneKg, DataSource::Evs, DataSource::Exac]
        );
        let buf = slot.to_vec()?;
        assert_eq!(buf[0], 0b1110);
        assert_eq!(AlleleSlot::from_slice(&buf)?, slot);

        Ok(())
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_source_is_skipped() {
        let mut slot = AlleleSlot::default();
        slot.add_or_merge_record(SourceRecord::DbSnp(DbSnpRecord::from_ids([42])))
            .unwrap();
        let mut buf = slot.to_vec().unwrap();
        // append a payload for bit 6, which no source uses
        buf[0] |= 1 << 6;
        buf.extend_from_slice(&[0x03, 0xaa, 0xbb, 0xcc]);

        let decoded = AlleleSlot::from_slice(&buf).unwrap();
        assert_eq!(decoded, slot);
        assert!(logs_contain("unknown data source bit 6"));
    }

    #[test]
    fn merge_slots() -> Result<(), anyhow::Error> {
        let mut lhs = AlleleSlot::default();
        lhs.add_or_merge_record(SourceRecord::DbSnp(DbSnpRecord::from_ids([1])))?;
        let mut rhs = AlleleSlot::default();
        rhs.add_or_merge_record(SourceRecord::DbSnp(DbSnpRecord::from_ids([2])))?;
        rhs.add_or_merge_record(exac(3))?;

        let counters = lhs.merge(&rhs)?;
        assert_eq!(counters.combined, 1);
        assert_eq!(counters.adopted, 1);
        assert_eq!(
            lhs.get_record(DataSource::DbSnp),
            Some(&SourceRecord::DbSnp(DbSnpRecord::from_ids([1, 2])))
        );

        Ok(())
    }
}
