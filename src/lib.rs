//! wastetree: registration-point hierarchies for food-waste accounting.
//!
//! Layers, from the inside out:
//! - `domain`: tree index, ancestry, membership, rollups, cascades, scopes
//! - `application`: per-customer registry and reports
//! - `infrastructure`: storage and service wiring
//! - `cli`: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
