//! Canonical representation of reference/alternate allele pairs.
//!
//! Every allele that enters a position record is first reduced to one of a
//! small number of shapes:
//!
//! - substitution (SNV/MNV): trimmed alleles of equal length, alternate as-is
//! - insertion: empty reference, alternate `i` followed by the inserted bases
//! - deletion: alternate is the decimal length of the deleted reference
//! - deletion-insertion: alternate is the deleted length followed by the inserted bases
//!
//! Alleles already in one of these shapes (leading `i`, `<`, or digit) pass
//! through unchanged, which makes canonicalization idempotent.

use serde::Serialize;

use crate::err::SaError;

/// Marker prefixed to the inserted bases of an insertion.
pub const INSERTION_MARKER: char = 'i';
/// Leading character of symbolic alleles such as `<DEL>`.
pub const SYMBOLIC_MARKER: char = '<';

/// Shape of a canonical allele.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlleleShape {
    /// Alternate equals reference; annotates the reference allele itself.
    Reference,
    Substitution,
    Insertion,
    Deletion,
    DeletionInsertion,
    /// Symbolic allele, stored as given.
    Symbolic,
}

/// Result of canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalAllele {
    /// 1-based start after trimming the common prefix.
    pub start: i32,
    /// Trimmed reference allele.
    pub reference: String,
    /// Canonical alternate allele.
    pub alternate: String,
    pub shape: AlleleShape,
}

fn is_base(c: char) -> bool {
    matches!(
        c,
        'A' | 'C' | 'G' | 'T' | 'N' | 'a' | 'c' | 'g' | 't' | 'n'
    )
}

/// Reduce `reference`/`alternate` at `start` to canonical shape.
pub fn canonicalize(
    start: i32,
    reference: &str,
    alternate: &str,
) -> Result<CanonicalAllele, SaError> {
    let fail = |reason: &str| SaError::AlleleCanonicalization {
        position: start,
        reference: reference.to_string(),
        alternate: alternate.to_string(),
        reason: reason.to_string(),
    };

    if !reference.chars().all(is_base) {
        return Err(fail("reference contains non-nucleotide characters"));
    }

    let canonical = |start: i32, reference: &str, alternate: String, shape| CanonicalAllele {
        start,
        reference: reference.to_string(),
        alternate,
        shape,
    };

    if alternate.is_empty() {
        if reference.is_empty() {
            return Err(fail("both alleles are empty"));
        }
        return Ok(canonical(
            start,
            reference,
            reference.len().to_string(),
            AlleleShape::Deletion,
        ));
    }
    if reference == alternate {
        return Ok(canonical(
            start,
            reference,
            alternate.to_string(),
            AlleleShape::Reference,
        ));
    }
    if let Some(shape) = precanonical_shape(alternate).map_err(|reason| fail(reason))? {
        return Ok(canonical(start, reference, alternate.to_string(), shape));
    }
    if reference.is_empty() {
        return Err(fail("empty reference with unmarked alternate"));
    }
    if !alternate.chars().all(is_base) {
        return Err(fail("alternate contains non-nucleotide characters"));
    }

    // Alleles are validated ASCII from here on, so byte offsets are char offsets.
    let (ref_bytes, alt_bytes) = (reference.as_bytes(), alternate.as_bytes());
    let prefix = ref_bytes
        .iter()
        .zip(alt_bytes)
        .take_while(|(r, a)| r == a)
        .count();
    let (ref_rest, alt_rest) = (&ref_bytes[prefix..], &alt_bytes[prefix..]);
    let suffix = ref_rest
        .iter()
        .rev()
        .zip(alt_rest.iter().rev())
        .take_while(|(r, a)| r == a)
        .count();
    let trimmed_ref = &reference[prefix..reference.len() - suffix];
    let trimmed_alt = &alternate[prefix..alternate.len() - suffix];
    let new_start = start
        .checked_add(i32::try_from(prefix).map_err(|_| fail("allele too long"))?)
        .ok_or_else(|| fail("position overflow"))?;

    Ok(if trimmed_alt.is_empty() {
        canonical(
            new_start,
            trimmed_ref,
            trimmed_ref.len().to_string(),
            AlleleShape::Deletion,
        )
    } else if trimmed_ref.is_empty() {
        canonical(
            new_start,
            trimmed_ref,
            format!("{}{}", INSERTION_MARKER, trimmed_alt),
            AlleleShape::Insertion,
        )
    } else if trimmed_ref.len() == trimmed_alt.len() {
        canonical(
            new_start,
            trimmed_ref,
            trimmed_alt.to_string(),
            AlleleShape::Substitution,
        )
    } else {
        canonical(
            new_start,
            trimmed_ref,
            format!("{}{}", trimmed_ref.len(), trimmed_alt),
            AlleleShape::DeletionInsertion,
        )
    })
}

/// Detect alternates that are already canonical; validates their body.
fn precanonical_shape(alternate: &str) -> Result<Option<AlleleShape>, &'static str> {
    if alternate.starts_with(SYMBOLIC_MARKER) {
        return Ok(Some(AlleleShape::Symbolic));
    }
    if let Some(inserted) = alternate.strip_prefix(INSERTION_MARKER) {
        if inserted.is_empty() || !inserted.chars().all(is_base) {
            return Err("invalid inserted bases after insertion marker");
        }
        return Ok(Some(AlleleShape::Insertion));
    }
    if alternate.starts_with(|c: char| c.is_ascii_digit()) {
        let inserted = alternate.trim_start_matches(|c: char| c.is_ascii_digit());
        if inserted.is_empty() {
            return Ok(Some(AlleleShape::Deletion));
        }
        if !inserted.chars().all(is_base) {
            return Err("invalid inserted bases after deletion length");
        }
        return Ok(Some(AlleleShape::DeletionInsertion));
    }
    Ok(None)
}

/// Convert a canonical alternate back to the bases it contributes, `-` for a
/// pure deletion.
pub fn reverse_reduced_allele(alternate: &str) -> String {
    if !alternate.is_empty() && alternate.chars().all(|c| c.is_ascii_digit()) {
        return "-".to_string();
    }
    if alternate.starts_with(SYMBOLIC_MARKER) {
        return alternate.to_string();
    }
    alternate
        .strip_prefix(INSERTION_MARKER)
        .unwrap_or(alternate)
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .to_string()
}

/// Whether the canonical alternate is a single nucleotide.
pub fn is_snv(alternate: &str) -> bool {
    matches!(alternate, "A" | "C" | "G" | "T")
}
