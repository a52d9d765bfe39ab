// NF-e batch classification engine.
//
// Takes an in-memory zip of fiscal XML documents, inspects each document's
// authorization status (cStat) and emission type (tpEmis), and assembles a
// new zip with the documents sorted into aprovados/, contingencia/ and
// rejeitados/, plus a rejection report when anything was rejected.
//
// Everything is buffered in memory; the engine has no network or disk I/O.

pub mod archive;
pub mod batch;
pub mod classify;
pub mod output;

pub use archive::{read_document_entries, ArchiveEntry, ArchiveError};
pub use batch::{process_batch, BatchResult, RunStatistics};
pub use classify::{classify, Category, ClassificationResult, DocumentError};
pub use output::{OutputArchiveBuilder, RejectionRecord};
