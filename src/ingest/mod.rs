//! Bulk ingestion of profile submissions.
//!
//! A submission goes through four stages: schema check, marker cleaning
//! (invalid values dropped, empty samples skipped), deduplication by kit
//! (last occurrence wins), and chunked upserts, one store transaction per
//! chunk. The result cache is invalidated once per call.

pub mod bulk;

pub use bulk::{BulkIngestor, BulkOptions, ChunkProgress, IngestError, IngestReport};
