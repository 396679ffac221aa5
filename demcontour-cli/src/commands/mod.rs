//! CLI subcommands.

pub mod fetch;
