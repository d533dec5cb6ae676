pub mod chunker;
pub mod pdf;
pub mod segmenter;
pub mod splitter;
pub mod web;

pub use chunker::{process_chunks, ChunkSet};
pub use segmenter::{extract_tables_and_text, Segment};
pub use splitter::RecursiveSplitter;
