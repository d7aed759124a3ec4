//! Stratum CLI library - argument parsing, commands, and output helpers.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
