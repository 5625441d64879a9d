//! CLI module for runplane - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
