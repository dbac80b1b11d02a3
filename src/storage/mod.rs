pub mod chunk;
pub mod chunk_store;
pub mod shared_folder;
pub mod source;

pub use chunk::{Chunk, content_hash, split_chunks};
pub use chunk_store::{ChunkStore, FileMetadata};
pub use shared_folder::SharedFolder;
pub use source::{FileSource, validate_filename};
