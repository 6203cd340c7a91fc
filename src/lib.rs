//! clipmap: maps a requested path prefix to a JSON manifest of stored media
//! objects, optionally as time-limited signed URLs.

pub mod core;
pub mod delivery;
pub mod mapping;
pub mod observability;
pub mod storage;
