pub mod downloader;
pub mod uploader;

pub use downloader::{Downloader, Transfer};
pub use uploader::{FileServer, serve_file};
