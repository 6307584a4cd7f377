//! The `pbir` command line. Argument parsing and output live here so the binary stays a thin
//! wrapper around [`cli::run`].

pub mod cli;
pub mod logger;
