//! Process bootstrap shared by the operator binaries.

pub mod cli;
