//! Global major/minor allele and reference-minor classification.

use std::collections::BTreeMap;

use crate::sa::alleles::is_snv;
use crate::sa::slot::AlleleSlot;
use crate::sa::sources::DataSource;

/// Summed non-reference SNV frequency from which the reference counts as minor.
pub const REF_MINOR_THRESHOLD: f64 = 0.95;

/// Tolerance for comparing frequencies.
const EPSILON: f64 = 1e-9;

/// Sources consulted for an allele's frequency, in order of precedence.
const FREQUENCY_SOURCES: [DataSource; 3] = [DataSource::OneKg, DataSource::Exac, DataSource::Evs];

/// Frequency of the allele of `slot` from the first non-conflicted source with usable counts.
pub fn slot_frequency(slot: &AlleleSlot) -> Option<f64> {
    FREQUENCY_SOURCES.iter().find_map(|source| {
        slot.visible_record(*source)
            .and_then(|record| record.all_counts())
            .and_then(|counts| counts.frequency())
    })
}

/// Map every allele with a known frequency to that frequency.
pub fn allele_frequencies<'a, I>(alleles: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (&'a String, &'a AlleleSlot)>,
{
    alleles
        .into_iter()
        .filter_map(|(allele, slot)| slot_frequency(slot).map(|freq| (allele.clone(), freq)))
        .collect()
}

/// Pick the most frequent allele.
///
/// Among tied alleles, the reference wins if `prefer_ref` is set; otherwise
/// the reference is passed over and the lexicographically smallest remaining
/// allele is taken.
fn most_frequent(
    frequencies: &BTreeMap<String, f64>,
    ref_allele: Option<&str>,
    prefer_ref: bool,
) -> Option<(String, f64)> {
    let max = frequencies.values().copied().reduce(f64::max)?;
    let ties = frequencies
        .iter()
        .filter(|(_, freq)| max - **freq <= EPSILON)
        .collect::<Vec<_>>();
    let is_ref = |allele: &str| Some(allele) == ref_allele;

    let (allele, freq) = if ties.len() == 1 {
        ties[0]
    } else if prefer_ref && ties.iter().any(|(allele, _)| is_ref(allele.as_str())) {
        *ties.iter().find(|(allele, _)| is_ref(allele.as_str()))?
    } else {
        *ties.iter().find(|(allele, _)| !is_ref(allele.as_str()))?
    };
    Some((allele.clone(), *freq))
}

/// Globally most and second most frequent alleles.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GlobalAlleles {
    pub major: Option<(String, f64)>,
    pub minor: Option<(String, f64)>,
}

pub fn global_alleles(
    frequencies: &BTreeMap<String, f64>,
    ref_allele: Option<&str>,
) -> GlobalAlleles {
    let major = most_frequent(frequencies, ref_allele, true);
    let minor = major.as_ref().and_then(|(major_allele, _)| {
        let mut rest = frequencies.clone();
        rest.remove(major_allele);
        most_frequent(&rest, ref_allele, false)
    });
    GlobalAlleles { major, minor }
}

/// Whether the summed frequency of non-reference SNVs reaches the threshold.
pub fn is_reference_minor(frequencies: &BTreeMap<String, f64>, ref_allele: Option<&str>) -> bool {
    let sum: f64 = frequencies
        .iter()
        .filter(|(allele, _)| is_snv(allele) && Some(allele.as_str()) != ref_allele)
        .map(|(_, freq)| freq)
        .sum();
    sum + EPSILON >= REF_MINOR_THRESHOLD
}

/// Render a frequency as stored in position records.
pub fn format_frequency(frequency: f64) -> String {
    format!("{}", (frequency * 1e6).round() / 1e6)
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    fn freqs(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values
            .iter()
            .map(|(allele, freq)| (allele.to_string(), *freq))
            .collect()
    }

    #[test]
    fn major_and_minor() {
        let result = global_alleles(&freqs(&[("A", 30.0 / 100.0), ("C", 70.0 / 100.0)]), Some("G"));

        let (major, major_freq) = result.major.unwrap_or_default();
        let (minor, minor_freq) = result.minor.unwrap_or_default();
        assert_eq!(major, "C");
        assert!(approx_eq!(f64, major_freq, 0.7, ulps = 2));
        assert_eq!(minor, "A");
        assert!(approx_eq!(f64, minor_freq, 0.3, ulps = 2));
    }

    #[test]
    fn tie_goes_to_reference() {
        let result = global_alleles(&freqs(&[("A", 0.5), ("C", 0.5)]), Some("A"));

        assert_eq!(result.major.map(|(allele, _)| allele).as_deref(), Some("A"));
        assert_eq!(result.minor.map(|(allele, _)| allele).as_deref(), Some("C"));
    }

    #[test]
    fn minor_tie_skips_reference() {
        let result = global_alleles(
            &freqs(&[("A", 0.2), ("C", 0.2), ("T", 0.6), ("G", 0.2)]),
            Some("A"),
        );

        assert_eq!(result.major.map(|(allele, _)| allele).as_deref(), Some("T"));
        assert_eq!(result.minor.map(|(allele, _)| allele).as_deref(), Some("C"));
    }

    #[test]
    fn tie_without_reference_is_lexicographic() {
        let result = global_alleles(&freqs(&[("T", 0.4), ("G", 0.4), ("iA", 0.2)]), Some("C"));

        assert_eq!(result.major.map(|(allele, _)| allele).as_deref(), Some("G"));
        assert_eq!(result.minor.map(|(allele, _)| allele).as_deref(), Some("T"));
    }

    #[test]
    fn empty_leaves_unset() {
        assert_eq!(
            global_alleles(&BTreeMap::new(), Some("A")),
            GlobalAlleles::default()
        );
        let single = global_alleles(&freqs(&[("C", 0.1)]), Some("A"));
        assert!(single.major.is_some());
        assert!(single.minor.is_none());
    }

    #[rstest::rstest]
    #[case(&[("C", 0.95)], true)]
    #[case(&[("C", 0.94999)], false)]
    #[case(&[("C", 0.5), ("G", 0.45)], true)]
    #[case(&[("C", 0.9), ("iCC", 0.1)], false)]
    #[case(&[("A", 0.96)], false)]
    fn reference_minor(#[case] values: &[(&str, f64)], #[case] expected: bool) {
        assert_eq!(is_reference_minor(&freqs(values), Some("A")), expected);
    }

    #[rstest::rstest]
    #[case(0.7, "0.7")]
    #[case(1.0 / 3.0, "0.333333")]
    #[case(1.0, "1")]
    #[case(0.0, "0")]
    fn formatting(#[case] frequency: f64, #[case] expected: &str) {
        assert_eq!(format_frequency(frequency), expected);
    }
}
