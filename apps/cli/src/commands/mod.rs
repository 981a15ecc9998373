//! Command implementations for the Booth CLI.

pub mod extract;
pub mod package;
pub mod run;
