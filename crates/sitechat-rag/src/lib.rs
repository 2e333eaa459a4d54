//! Retrieval pipeline: chunking, embedding ingestion, and similarity ranking.

pub mod chunker;
pub mod pipeline;
pub mod ranker;

pub use chunker::chunk_text;
pub use pipeline::IngestPipeline;
pub use ranker::{cosine_similarity, rank_chunks};
