//! ZIP container support: records, random access reading, streaming
//! writing and the archive offset locator for prefixed containers.

pub mod offset;
pub mod reader;
pub mod record;
pub mod writer;

pub use offset::archive_offset;
pub use reader::{ZipArchive, ZipSource};
pub use record::ZipEntry;
pub use writer::{EntryHeader, ZipWriter};
