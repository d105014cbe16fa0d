//! Locates the byte position where ZIP structure begins inside a container
//! that may carry an arbitrary prefix, such as a copy of the serving
//! executable.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::global::error::*;
use crate::zip::record;

fn rfind_eocd(tail: &[u8]) -> Option<usize> {
	if tail.len() < 4 {
		return None;
	}
	(0..=tail.len() - 4).rev().find(|&pos| LittleEndian::read_u32(&tail[pos..pos + 4]) == record::EOCD_SIGNATURE)
}

/// Returns the archive offset of `path`: the position of the first local
/// file header, read from the first central directory record. Zero for a
/// plain ZIP, the prefix length for a self-executable one.
pub fn archive_offset(path: impl AsRef<Path>) -> InternalResult<u64> {
	let mut fp = File::open(path.as_ref())?;
	let size = fp.metadata()?.len();

	// 512 bytes of tail cover every commentless archive; retry with the
	// full comment window when that misses
	let mut window = 512u64.min(size);
	let (tail, index) = loop {
		fp.seek(SeekFrom::End(-(window as i64)))?;
		let mut tail = vec![0u8; window as usize];
		fp.read_exact(&mut tail)?;
		match rfind_eocd(&tail) {
			Some(index) => break (tail, index),
			None => {
				let wide = (64 * 1024 + record::EOCD_SIZE as u64).min(size);
				if wide == window {
					return Err(InternalError::MalformedArchive(format!(
						"end of central directory not found in {}",
						path.as_ref().display()
					)));
				}
				window = wide;
			},
		}
	};

	let directory_size = LittleEndian::read_u32(&tail[index + 0x0c..index + 0x10]) as i64;
	// seek back over the directory to its first record
	let head_pos = -(window as i64) + index as i64 - directory_size;
	fp.seek(SeekFrom::End(head_pos))?;
	let mut head = [0u8; 0x30];
	fp.read_exact(&mut head)?;
	if LittleEndian::read_u32(&head[0..4]) != record::CDFH_SIGNATURE {
		return Err(InternalError::MalformedArchive(format!(
			"central directory signature mismatch in {}",
			path.as_ref().display()
		)));
	}
	let offset = LittleEndian::read_u32(&head[0x2a..0x2e]) as u64;
	debug!("archive offset: file={} offset={}", path.as_ref().display(), offset);
	Ok(offset)
}
