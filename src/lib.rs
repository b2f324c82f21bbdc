//! Song catalog store: songs and their audio blobs persisted as JSON snapshots
//! in a pluggable key-value backend, plus the search/sort/filter queries the
//! browse views run against them.

pub mod cli;
pub mod config;
pub mod domain;
pub mod storage;

pub use domain::{audio::AudioBlob, song::Song};
pub use storage::catalog::CatalogStore;
