//! Command implementations

pub(crate) mod columns;
pub(crate) mod common;
pub(crate) mod plan;
pub(crate) mod query;
pub(crate) mod run;
