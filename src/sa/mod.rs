//! Supplementary annotation: canonical alleles, per-source records, merging, and the store.

pub mod alleles;
pub mod codec;
pub mod frequency;
pub mod intervals;
pub mod items;
pub mod legacy;
pub mod merge;
pub mod position;
pub mod query;
pub mod records;
pub mod slot;
pub mod sources;
pub mod store;
