//! Error types of the supplementary annotation store.

use crate::sa::sources::DataSource;

/// Errors raised while canonicalizing, merging, encoding, or decoding annotations.
#[derive(thiserror::Error, Debug)]
pub enum SaError {
    /// The byte stream of a single record does not follow the record grammar.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// A stored bit refers to a data source this reader does not know.
    #[error("unknown data source bit {0}")]
    UnknownDataSource(u8),
    /// A tagged field refers to an id this reader does not know.
    #[error("unknown {context} field id {id}")]
    UnknownFieldId { context: &'static str, id: u8 },
    /// The input allele pair cannot be brought into canonical shape.
    #[error("cannot canonicalize {reference:?}>{alternate:?} at {position}: {reason}")]
    AlleleCanonicalization {
        position: i32,
        reference: String,
        alternate: String,
        reason: String,
    },
    /// The record framing of the store is broken; reading cannot continue.
    #[error("framing error at offset {offset}: {reason}")]
    Framing { offset: u64, reason: String },
    /// Attempted to merge records of two different sources.
    #[error("cannot merge {actual} record into {expected} record")]
    SourceMismatch {
        expected: DataSource,
        actual: DataSource,
    },
    /// Attempted to merge records of two different positions.
    #[error("cannot merge position {actual} into position {expected}")]
    PositionMismatch { expected: String, actual: String },
    /// The store writer was fed positions out of order.
    #[error("position {chrom}:{position} written out of order")]
    OutOfOrder { chrom: String, position: i32 },
    /// Chromosome name that does not map to a canonical chromosome.
    #[error("unknown chromosome {0:?}")]
    UnknownChromosome(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
