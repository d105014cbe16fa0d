//! Worker-private ZIP sinks. Each compressor thread owns exactly one sink,
//! either a file in the build's temp directory or an in-memory buffer, and
//! the merge phase reopens them as archives.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::global::error::*;
use crate::zip::reader::ZipArchive;
use crate::zip::writer::ZipWriter;

/// The write side of a sink.
pub enum SinkIo {
	File(File),
	Mem(Vec<u8>),
}

impl Write for SinkIo {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self {
			SinkIo::File(fp) => fp.write(buf),
			SinkIo::Mem(vec) => vec.write(buf),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self {
			SinkIo::File(fp) => fp.flush(),
			SinkIo::Mem(_) => Ok(()),
		}
	}
}

/// One temporary archive target.
pub struct Sink {
	path: Option<PathBuf>,
}

impl Sink {
	pub fn file(path: PathBuf) -> Sink {
		Sink { path: Some(path) }
	}

	pub fn memory() -> Sink {
		Sink { path: None }
	}

	/// Opens the ZIP writer for this sink.
	pub fn writer(&self) -> InternalResult<ZipWriter<SinkIo>> {
		match &self.path {
			Some(path) => Ok(ZipWriter::new(SinkIo::File(File::create(path)?))),
			None => Ok(ZipWriter::new(SinkIo::Mem(Vec::new()))),
		}
	}

	/// Closes the writer and reopens the sink as a readable archive.
	pub fn finish(&self, writer: ZipWriter<SinkIo>) -> InternalResult<ZipArchive> {
		match writer.finish()? {
			SinkIo::File(fp) => {
				fp.sync_all()?;
				drop(fp);
				// path is always present for file-backed sinks
				let path = self.path.as_ref().expect("file sink without a path");
				ZipArchive::open(path)
			},
			SinkIo::Mem(buffer) => ZipArchive::from_bytes(buffer),
		}
	}
}
