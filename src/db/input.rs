//! Parsing of the generic supplementary item TSV files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use enum_map::{EnumArray, EnumMap};
use serde::{de::DeserializeOwned, Deserialize};

use crate::common::io::open_read_maybe_gz;
use crate::sa::intervals::{SupplementaryInterval, VariantType};
use crate::sa::items::{ClinVarItem, CosmicItem, CustomItem};
use crate::sa::merge::{ItemPayload, PositionMap, SupplementaryItem};
use crate::sa::records::{
    AlleleCounts, DbSnpRecord, EvsPopulation, EvsRecord, ExacPopulation, ExacRecord,
    OneKgPopulation, OneKgRecord, SourceRecord,
};

/// Sources of input rows.
#[derive(
    Deserialize,
    strum::EnumString,
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
pub enum InputSource {
    DbSnp,
    OneKg,
    Evs,
    Exac,
    ClinVar,
    Cosmic,
    Custom,
}

/// One row of an item TSV file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Record {
    /// Chromosome name.
    pub chrom: String,
    /// 1-based start position.
    pub pos: i32,
    /// Reference allele.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Alternate allele, may be empty.
    #[serde(rename = "alt")]
    pub alternate: String,
    /// End position of interval rows.
    pub end: Option<i32>,
    /// Variant type of interval rows.
    pub variant_type: Option<VariantType>,
    /// Name of the source.
    pub source: String,
    /// JSON object with the source-specific fields.
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DbSnpFields {
    ids: BTreeSet<i64>,
}

#[derive(Debug, Deserialize)]
struct OneKgFields {
    ancestral_allele: Option<String>,
    #[serde(default)]
    populations: BTreeMap<OneKgPopulation, AlleleCounts>,
}

#[derive(Debug, Deserialize)]
struct EvsFields {
    coverage: Option<i32>,
    num_samples: Option<i32>,
    #[serde(default)]
    populations: BTreeMap<EvsPopulation, AlleleCounts>,
}

#[derive(Debug, Deserialize)]
struct ExacFields {
    coverage: Option<i32>,
    #[serde(default)]
    populations: BTreeMap<ExacPopulation, AlleleCounts>,
}

/// Fields of interval rows.
#[derive(Debug, Deserialize, Default)]
struct IntervalFields {
    #[serde(default)]
    string_fields: BTreeMap<String, String>,
}

fn populations<P>(values: BTreeMap<P, AlleleCounts>) -> EnumMap<P, Option<AlleleCounts>>
where
    P: EnumArray<Option<AlleleCounts>>,
{
    let mut result = EnumMap::default();
    for (population, counts) in values {
        result[population] = Some(counts);
    }
    result
}

/// A parsed input row.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Item(SupplementaryItem),
    Interval(SupplementaryInterval),
}

impl Record {
    fn fields<T: DeserializeOwned>(&self) -> Result<T, anyhow::Error> {
        let fields = self.fields.as_deref().unwrap_or("{}");
        serde_json::from_str(fields).map_err(|e| {
            anyhow::anyhow!("invalid fields of {} row {:?}: {}", &self.source, fields, e)
        })
    }

    /// Convert into an item or an interval.
    pub fn parse(&self) -> Result<Parsed, anyhow::Error> {
        let source: InputSource = self
            .source
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown source {:?}", &self.source))?;

        if let (Some(end), Some(variant_type)) = (self.end, self.variant_type) {
            let fields: IntervalFields = self.fields()?;
            return Ok(Parsed::Interval(SupplementaryInterval {
                chrom: self.chrom.clone(),
                start: self.pos,
                end,
                variant_type,
                source: source.to_string(),
                string_fields: fields.string_fields,
            }));
        }

        let payload = match source {
            InputSource::DbSnp => {
                let fields: DbSnpFields = self.fields()?;
                ItemPayload::Allele(SourceRecord::DbSnp(DbSnpRecord::from_ids(fields.ids)))
            }
            InputSource::OneKg => {
                let fields: OneKgFields = self.fields()?;
                ItemPayload::Allele(SourceRecord::OneKg(OneKgRecord::new(
                    fields.ancestral_allele,
                    populations(fields.populations),
                )))
            }
            InputSource::Evs => {
                let fields: EvsFields = self.fields()?;
                ItemPayload::Allele(SourceRecord::Evs(EvsRecord::new(
                    fields.coverage,
                    fields.num_samples,
                    populations(fields.populations),
                )))
            }
            InputSource::Exac => {
                let fields: ExacFields = self.fields()?;
                ItemPayload::Allele(SourceRecord::Exac(ExacRecord::new(
                    fields.coverage,
                    populations(fields.populations),
                )))
            }
            InputSource::ClinVar => ItemPayload::ClinVar(self.fields::<ClinVarItem>()?),
            InputSource::Cosmic => ItemPayload::Cosmic(self.fields::<CosmicItem>()?),
            InputSource::Custom => ItemPayload::Custom(self.fields::<CustomItem>()?),
        };

        Ok(Parsed::Item(SupplementaryItem {
            chrom: self.chrom.clone(),
            start: self.pos,
            reference: self.reference.clone(),
            alternate: self.alternate.clone(),
            payload,
        }))
    }
}

/// Result of loading one input file.
#[derive(Debug, Default)]
pub struct Loaded {
    pub positions: PositionMap,
    /// Number of rows read.
    pub rows: usize,
    /// Number of rejected rows.
    pub rejected: usize,
}

/// Load the rows of one TSV file into a fresh position map.
///
/// Rows that cannot be parsed or merged are logged and counted.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Loaded, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .comment(Some(b'#'))
        .quoting(false)
        .from_reader(open_read_maybe_gz(path.as_ref())?);

    let mut result = Loaded::default();
    for record in reader.deserialize::<Record>() {
        result.rows += 1;
        let outcome = record
            .map_err(|e| anyhow::anyhow!("{}", e))
            .and_then(|record: Record| {
                let added = match record.parse()? {
                    Parsed::Item(item) => result.positions.add_item(item),
                    Parsed::Interval(interval) => result.positions.add_interval(interval),
                };
                added.map_err(|e| anyhow::anyhow!("{}:{}: {}", &record.chrom, record.pos, e))
            });
        if let Err(e) = outcome {
            result.rejected += 1;
            tracing::warn!("{:?}: rejected row {}: {}", path.as_ref(), result.rows, e);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sa::sources::DataSource;

    const HEADER: &str = "chrom\tpos\tref\talt\tend\tvariant_type\tsource\tfields\n";

    fn record(source: &str, fields: &str) -> Record {
        Record {
            chrom: "1".into(),
            pos: 100,
            reference: "A".into(),
            alternate: "G".into(),
            end: None,
            variant_type: None,
            source: source.into(),
            fields: Some(fields.into()),
        }
    }

    #[test]
    fn parse_population_record() -> Result<(), anyhow::Error> {
        let parsed = record(
            "exac",
            r#"{
                "coverage": 30,
                "populations": {
                    "all": {"count": 3, "total": 100},
                    "nfe": {"count": 1, "total": 50}
                }
            }"#,
        )
        .parse()?;

        let Parsed::Item(item) = parsed else {
            anyhow::bail!("expected an item");
        };
        let ItemPayload::Allele(SourceRecord::Exac(exac)) = item.payload else {
            anyhow::bail!("expected an ExAC record");
        };
        assert_eq!(exac.coverage, Some(30));
        assert_eq!(exac.populations[ExacPopulation::All], Some(AlleleCounts::new(3, 100)));
        assert_eq!(exac.populations[ExacPopulation::Afr], None);

        Ok(())
    }

    #[test]
    fn parse_clinvar() -> Result<(), anyhow::Error> {
        let parsed = record(
            "clinvar",
            r#"{
                "id": "RCV000012345",
                "significance": "pathogenic",
                "review_status": "expert_panel",
                "pubmed_ids": [1, 2]
            }"#,
        )
        .parse()?;

        let Parsed::Item(SupplementaryItem {
            payload: ItemPayload::ClinVar(clinvar),
            ..
        }) = parsed
        else {
            anyhow::bail!("expected a ClinVar item");
        };
        assert_eq!(clinvar.id, "RCV000012345");
        assert_eq!(clinvar.pubmed_ids.len(), 2);

        Ok(())
    }

    #[test]
    fn parse_interval() -> Result<(), anyhow::Error> {
        let mut row = record("custom", r#"{"string_fields": {"id": "esv1"}}"#);
        row.end = Some(5000);
        row.variant_type = Some(VariantType::CopyNumberGain);

        let Parsed::Interval(interval) = row.parse()? else {
            anyhow::bail!("expected an interval");
        };
        assert_eq!(interval.end, 5000);
        assert_eq!(interval.source, "custom");
        assert_eq!(interval.string_fields["id"], "esv1");

        Ok(())
    }

    #[rstest::rstest]
    #[case("gnomad", "{}")]
    #[case("dbsnp", "{\"ids\": [\"rs1\"]}")]
    #[case("onekg", "not json")]
    fn reject_row(#[case] source: &str, #[case] fields: &str) {
        assert!(record(source, fields).parse().is_err());
    }

    #[tracing_test::traced_test]
    #[test]
    fn load_isolates_bad_rows() {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("items.tsv");
        let content = [
            HEADER,
            "# comment\n",
            "chr1\t100\tA\tAGT\t\t\tdbsnp\t{\"ids\": [1]}\n",
            "chrUn\t100\tA\tG\t\t\tdbsnp\t{\"ids\": [2]}\n",
            "1\t100\t\tG\t\t\tdbsnp\t{\"ids\": [3]}\n",
            "1\t200\tC\t\t\t\tonekg\t{\"populations\": {\"all\": {\"count\": 1, \"total\": 10}}}\n",
            "2\t1\tN\t<DEL>\t1000\tdeletion\tcustom\t\n",
        ]
        .concat();
        std::fs::write(&path, content).unwrap();

        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded.rows, 5);
        assert_eq!(loaded.rejected, 2);
        assert_eq!(loaded.positions.len(), 2);
        assert_eq!(loaded.positions.intervals().len(), 1);
        let inserted = loaded
            .positions
            .get("1", 101)
            .and_then(|r| r.slot("iGT"))
            .map(|s| s.has_source(DataSource::DbSnp));
        assert_eq!(inserted, Some(true));
        assert!(loaded.positions.get("1", 200).and_then(|r| r.slot("1")).is_some());
        assert!(logs_contain("rejected row 2"));
    }
}
