//! Code supporting the `db *` sub commands.

pub mod build;
pub mod conf;
pub mod dump;
pub mod input;
pub mod query;
