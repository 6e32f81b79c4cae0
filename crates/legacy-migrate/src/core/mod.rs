//! Core abstractions shared by the reader, the writers and the engine.
//!
//! - [`value`]: scalar values, legacy records and destination rows
//! - [`traits`]: the reader/writer seams the orchestrator drives

pub mod traits;
pub mod value;

pub use traits::{SourceReader, TargetWriter, WriteStrategy};
pub use value::{KeyPart, MergeKey, Row, SourceRecord, SqlValue};
