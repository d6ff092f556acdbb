//! LanceDB-backed persistence: versioned chunk snapshots, cosine candidate
//! retrieval, and the content-addressed embedding cache.
//!
//! A full build writes into a fresh `chunks_v<millis>` table and then flips
//! the `active_chunks_table` pointer in the meta table, so readers see either
//! the complete old snapshot or the complete new one, never a half-written
//! index.

pub mod cache;
pub mod schema;
pub mod store;
pub mod table;
pub mod vectorize;
