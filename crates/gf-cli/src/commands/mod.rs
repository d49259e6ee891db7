//! CLI command implementations

pub(crate) mod clean;
pub(crate) mod common;
pub(crate) mod export;
pub(crate) mod ls;
pub(crate) mod progress;
pub(crate) mod render;
pub(crate) mod reset;
pub(crate) mod run;
pub(crate) mod status;
