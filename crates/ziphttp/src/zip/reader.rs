//! Random access ZIP reader over either a file handle or an in-memory
//! buffer. The central directory is parsed once up front; entry bodies are
//! read with positioned reads, so one archive can serve many threads.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::global::codec;
use crate::global::error::*;
use crate::zip::record::{self, EndOfCentralDirectory, ZipEntry};

/// How many trailing bytes to inspect while hunting for the EOCD: the
/// maximum ZIP comment plus the record itself.
const EOCD_SEARCH_MAX: usize = 64 * 1024 + record::EOCD_SIZE;

/// Archive residency. Both variants satisfy the same positioned-read contract.
pub enum ZipSource {
	/// whole archive (from the archive offset on) resident in memory
	Mem(Vec<u8>),
	/// archive left on disk, read with `pread`
	File(File),
}

impl ZipSource {
	fn len(&self) -> io::Result<u64> {
		match self {
			ZipSource::Mem(buf) => Ok(buf.len() as u64),
			ZipSource::File(fp) => Ok(fp.metadata()?.len()),
		}
	}

	fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
		match self {
			ZipSource::Mem(data) => {
				let start = offset as usize;
				let end = start + buf.len();
				if end > data.len() {
					return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of archive"));
				}
				buf.copy_from_slice(&data[start..end]);
				Ok(())
			},
			ZipSource::File(fp) => {
				use std::os::unix::fs::FileExt;
				fp.read_exact_at(buf, offset)
			},
		}
	}
}

/// A parsed archive: source plus central directory.
pub struct ZipArchive {
	source: ZipSource,
	entries: Vec<ZipEntry>,
	/// bytes preceding the ZIP structure. Negative when a prefixed archive
	/// was sliced into memory from its archive offset: recorded positions
	/// still include the prefix, the data no longer does.
	base_offset: i64,
}

impl ZipArchive {
	/// Opens a file-backed archive.
	pub fn open(path: impl AsRef<Path>) -> InternalResult<ZipArchive> {
		let fp = File::open(path)?;
		ZipArchive::from_source(ZipSource::File(fp))
	}

	/// Parses an archive held entirely in memory.
	pub fn from_bytes(data: Vec<u8>) -> InternalResult<ZipArchive> {
		ZipArchive::from_source(ZipSource::Mem(data))
	}

	fn from_source(source: ZipSource) -> InternalResult<ZipArchive> {
		let size = source.len()?;
		let tail_len = (EOCD_SEARCH_MAX as u64).min(size) as usize;
		let tail_start = size - tail_len as u64;
		let mut tail = vec![0u8; tail_len];
		source.read_exact_at(tail_start, &mut tail)?;

		let pos = find_eocd(&tail)
			.ok_or_else(|| InternalError::MalformedArchive("end of central directory not found".into()))?;
		let (mut eocd, zip64) = EndOfCentralDirectory::parse_plain(&tail, pos)?;
		let mut directory_end = pos;
		if zip64 {
			let p64 = rfind_signature(&tail[..pos], record::EOCD64_SIGNATURE)
				.ok_or_else(|| InternalError::MalformedArchive("zip64 end of central directory not found".into()))?;
			eocd = EndOfCentralDirectory::parse_zip64(&tail, p64)?;
			directory_end = p64;
		}

		let directory_end_abs = tail_start + directory_end as u64;
		if directory_end_abs < eocd.directory_size {
			return Err(InternalError::MalformedArchive("central directory extends past its own offset".into()));
		}
		let base_offset = (directory_end_abs - eocd.directory_size) as i64 - eocd.directory_offset as i64;

		let mut directory = vec![0u8; eocd.directory_size as usize];
		source.read_exact_at(directory_end_abs - eocd.directory_size, &mut directory)?;

		let mut entries = Vec::with_capacity(eocd.entries as usize);
		let mut cursor = Cursor::new(directory.as_slice());
		for _ in 0..eocd.entries {
			entries.push(record::read_central_header(&mut cursor)?);
		}
		debug!("parsed archive: entries={} base_offset={}", entries.len(), base_offset);

		Ok(ZipArchive {
			source,
			entries,
			base_offset,
		})
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[ZipEntry] {
		&self.entries
	}

	pub fn entry(&self, index: usize) -> &ZipEntry {
		&self.entries[index]
	}

	/// Byte position where ZIP structure begins inside the container.
	pub fn base_offset(&self) -> i64 {
		self.base_offset
	}

	/// Absolute position of the entry's compressed payload, resolved by
	/// reading its local file header.
	fn data_offset(&self, entry: &ZipEntry) -> InternalResult<u64> {
		let header_pos = self.base_offset + entry.header_offset as i64;
		if header_pos < 0 {
			return Err(InternalError::MalformedArchive(format!(
				"local header of {} lies before the archive start",
				entry.name
			)));
		}
		let header_pos = header_pos as u64;
		let mut header = [0u8; record::LFH_SIZE];
		self.source.read_exact_at(header_pos, &mut header)?;
		if LittleEndian::read_u32(&header[0..4]) != record::LFH_SIGNATURE {
			return Err(InternalError::MalformedArchive(format!(
				"bad local header signature for {}",
				entry.name
			)));
		}
		let name_len = LittleEndian::read_u16(&header[26..28]) as u64;
		let extra_len = LittleEndian::read_u16(&header[28..30]) as u64;
		Ok(header_pos + record::LFH_SIZE as u64 + name_len + extra_len)
	}

	/// Reader over the raw (still compressed) payload of entry `index`.
	pub fn open_raw(&self, index: usize) -> InternalResult<RawReader<'_>> {
		let entry = &self.entries[index];
		let offset = self.data_offset(entry)?;
		Ok(RawReader {
			source: &self.source,
			position: offset,
			remaining: entry.compressed_size,
		})
	}

	/// Reader over the decoded payload of entry `index`.
	pub fn open_entry(&self, index: usize) -> InternalResult<Box<dyn Read + '_>> {
		let entry = &self.entries[index];
		let raw = self.open_raw(index)?;
		codec::decoder(entry.method, Box::new(raw))
	}

	/// Finds an entry by exact name.
	pub fn find(&self, name: &str) -> Option<usize> {
		self.entries.iter().position(|e| e.name == name)
	}

	/// Decoded contents of the named entry.
	pub fn read_content(&self, name: &str) -> InternalResult<Vec<u8>> {
		let index = self
			.find(name)
			.ok_or_else(|| InternalError::MissingEntry(name.to_string()))?;
		let mut out = Vec::with_capacity(self.entries[index].uncompressed_size as usize);
		self.open_entry(index)?.read_to_end(&mut out)?;
		Ok(out)
	}
}

/// Bounded positioned reader over an archive's payload range.
pub struct RawReader<'a> {
	source: &'a ZipSource,
	position: u64,
	remaining: u64,
}

impl Read for RawReader<'_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if self.remaining == 0 {
			return Ok(0);
		}
		let want = buf.len().min(self.remaining as usize);
		self.source.read_exact_at(self.position, &mut buf[..want])?;
		self.position += want as u64;
		self.remaining -= want as u64;
		Ok(want)
	}
}

/// Scans backwards for a plausible EOCD: the signature must be followed by a
/// comment length that reaches exactly to the end of the buffer.
fn find_eocd(tail: &[u8]) -> Option<usize> {
	if tail.len() < record::EOCD_SIZE {
		return None;
	}
	// common case first: no archive comment
	let last = tail.len() - record::EOCD_SIZE;
	if LittleEndian::read_u32(&tail[last..last + 4]) == record::EOCD_SIGNATURE
		&& LittleEndian::read_u16(&tail[last + 20..last + 22]) == 0
	{
		return Some(last);
	}
	for pos in (0..last).rev() {
		if LittleEndian::read_u32(&tail[pos..pos + 4]) == record::EOCD_SIGNATURE {
			let comment_len = LittleEndian::read_u16(&tail[pos + 20..pos + 22]) as usize;
			if pos + record::EOCD_SIZE + comment_len == tail.len() {
				return Some(pos);
			}
		}
	}
	None
}

fn rfind_signature(buf: &[u8], signature: u32) -> Option<usize> {
	if buf.len() < 4 {
		return None;
	}
	(0..=buf.len() - 4).rev().find(|&pos| LittleEndian::read_u32(&buf[pos..pos + 4]) == signature)
}
