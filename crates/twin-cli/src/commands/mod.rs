//! Subcommand implementations

pub mod alerts;
pub mod push;
pub mod twin;
