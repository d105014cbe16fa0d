//! Streaming ZIP writer. Entry payloads are handed over already compressed
//! with known sizes, so no data descriptors are ever emitted and the output
//! needs no seeking. A base offset shifts every recorded position, which is
//! how an archive lands after a self-executable prefix.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use log::debug;

use crate::global::error::*;
use crate::zip::reader::ZipArchive;
use crate::zip::record::{self, EndOfCentralDirectory, ZipEntry};

/// The caller-supplied part of a new entry.
#[derive(Debug, Clone)]
pub struct EntryHeader {
	pub name: String,
	pub method: u16,
	pub flags: u16,
	pub modified: DateTime<Utc>,
	pub comment: String,
}

impl EntryHeader {
	pub fn new(name: impl Into<String>, method: u16, modified: DateTime<Utc>) -> EntryHeader {
		EntryHeader {
			name: name.into(),
			method,
			flags: 0,
			modified,
			comment: String::new(),
		}
	}
}

/// Writes one ZIP stream: local headers and bodies as entries arrive, the
/// central directory and EOCD on [`finish`](ZipWriter::finish).
pub struct ZipWriter<W: Write> {
	out: W,
	/// absolute position in the container, starts at the base offset
	position: u64,
	entries: Vec<ZipEntry>,
}

impl<W: Write> ZipWriter<W> {
	pub fn new(out: W) -> ZipWriter<W> {
		ZipWriter::with_offset(out, 0)
	}

	/// A writer whose recorded offsets assume `base` bytes already precede
	/// the ZIP structure in the container.
	pub fn with_offset(out: W, base: u64) -> ZipWriter<W> {
		ZipWriter {
			out,
			position: base,
			entries: Vec::new(),
		}
	}

	// sizes always land in the local header here, so the streaming
	// data-descriptor flag from a source archive must not survive
	const DATA_DESCRIPTOR_FLAG: u16 = 0x0008;

	/// Appends an entry whose payload was compressed up front.
	pub fn add_entry(&mut self, header: EntryHeader, data: &[u8], crc32: u32, uncompressed_size: u64) -> InternalResult {
		let entry = ZipEntry {
			name: header.name,
			method: header.method,
			flags: header.flags & !Self::DATA_DESCRIPTOR_FLAG,
			crc32,
			compressed_size: data.len() as u64,
			uncompressed_size,
			modified: header.modified,
			comment: header.comment,
			header_offset: self.position,
		};
		record::write_local_header(&mut self.out, &entry)?;
		self.out.write_all(data)?;
		self.position += record::local_header_len(&entry) + data.len() as u64;
		self.entries.push(entry);
		Ok(())
	}

	/// Appends an entry by copying `compressed_size` raw bytes from `reader`
	/// without touching them. CRC and sizes come from the source archive.
	pub fn add_raw(
		&mut self, header: EntryHeader, crc32: u32, compressed_size: u64, uncompressed_size: u64,
		reader: &mut dyn Read,
	) -> InternalResult<u64> {
		let entry = ZipEntry {
			name: header.name,
			method: header.method,
			flags: header.flags & !Self::DATA_DESCRIPTOR_FLAG,
			crc32,
			compressed_size,
			uncompressed_size,
			modified: header.modified,
			comment: header.comment,
			header_offset: self.position,
		};
		record::write_local_header(&mut self.out, &entry)?;
		let written = std::io::copy(&mut reader.take(compressed_size), &mut self.out)?;
		if written != compressed_size {
			return Err(InternalError::ShortWrite {
				expected: compressed_size,
				written,
			});
		}
		self.position += record::local_header_len(&entry) + written;
		self.entries.push(entry);
		Ok(written)
	}

	/// Pass-through copy of entry `index` of `archive`, optionally renamed.
	/// The payload is never decoded.
	pub fn copy_from(&mut self, archive: &ZipArchive, index: usize, rename: Option<String>) -> InternalResult<u64> {
		let source = archive.entry(index);
		let header = EntryHeader {
			name: rename.unwrap_or_else(|| source.name.clone()),
			method: source.method,
			flags: source.flags,
			modified: source.modified,
			comment: source.comment.clone(),
		};
		let mut raw = archive.open_raw(index)?;
		self.add_raw(
			header,
			source.crc32,
			source.compressed_size,
			source.uncompressed_size,
			&mut raw,
		)
	}

	/// Entries written so far.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Writes the central directory and end records, returning the underlying
	/// writer. On success every recorded header references a valid local
	/// header and every CRC matches its payload.
	pub fn finish(mut self) -> InternalResult<W> {
		let directory_offset = self.position;
		let mut directory = Vec::new();
		for entry in &self.entries {
			record::write_central_header(&mut directory, entry)?;
		}
		self.out.write_all(&directory)?;
		let eocd = EndOfCentralDirectory {
			entries: self.entries.len() as u64,
			directory_size: directory.len() as u64,
			directory_offset,
		};
		eocd.write(&mut self.out, directory_offset + directory.len() as u64)?;
		self.out.flush()?;
		debug!(
			"archive written: entries={} directory_offset={}",
			self.entries.len(),
			directory_offset
		);
		Ok(self.out)
	}
}
