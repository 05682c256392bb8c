// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Labelwire — Core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::LinkConfig;
pub use error::LabelwireError;
pub use types::*;
