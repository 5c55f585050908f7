//! Orchestration for the `scmerge` command-line tool.
//!
//! See [`pipeline`] for the read → transform → write step behind each
//! subcommand.

pub mod pipeline;
