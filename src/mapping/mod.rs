//! Prefix-to-manifest mapping.
//!
//! A request prefix fans out to physical prefixes, each is listed with retry
//! and filtered by filename, the results are merged in fan-out order, extra
//! resources are appended and the signing stage runs last.

pub mod engine;
pub mod extra;
pub mod filter;
pub mod listing;
pub mod prefix;
pub mod sign;

pub use engine::MapEngine;
