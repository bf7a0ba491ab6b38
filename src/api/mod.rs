// Operator-facing API
//
// Configuration loading and report rendering shared by the binary.

mod config;
mod report;

pub use config::*;
pub use report::*;
