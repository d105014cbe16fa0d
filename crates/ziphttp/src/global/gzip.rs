//! RFC 1952 framing around ZIP entry payloads. A deflated entry becomes a
//! gzip stream by prepending a fixed 10 byte header and appending the CRC
//! and length trailer; the compressed body is copied untouched.

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::global::codec::method;
use crate::global::error::*;
use crate::zip::reader::ZipArchive;

/// header: ID1 ID2 CM FLG MTIME(4) XFL OS, no extra/name/comment fields
pub const GZIP_HEADER_SIZE: u64 = 10;
/// trailer: CRC32(4) + ISIZE(4)
pub const GZIP_FOOTER_SIZE: u64 = 8;

struct CountWriter<'a> {
	inner: &'a mut dyn Write,
	written: u64,
}

impl Write for CountWriter<'_> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let n = self.inner.write(buf)?;
		self.written += n as u64;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.inner.flush()
	}
}

/// Writes entry `index` of `archive` to `out` as a gzip stream, returning
/// the bytes written. Deflated entries are framed without re-encoding, so
/// the output length is always `compressed_size + 18`; anything else is
/// decoded and squeezed through a regular gzip encoder.
pub fn copy_gzip(out: &mut dyn Write, archive: &ZipArchive, index: usize) -> InternalResult<u64> {
	let entry = archive.entry(index);
	if entry.method != method::DEFLATE {
		let mut counter = CountWriter { inner: out, written: 0 };
		let mut encoder = GzEncoder::new(&mut counter, Compression::default());
		let mut reader = archive.open_entry(index)?;
		io::copy(&mut reader, &mut encoder)?;
		encoder.finish()?;
		return Ok(counter.written);
	}

	let mut written = 0u64;
	let mut header = [0u8; GZIP_HEADER_SIZE as usize];
	header[0] = 0x1f;
	header[1] = 0x8b;
	header[2] = 0x08; // deflate
	header[3] = 0x01; // FTEXT off, header CRC off; matches the original framing
	LittleEndian::write_u32(&mut header[4..8], (entry.modified.timestamp() & 0xffff_ffff) as u32);
	header[8] = match entry.flags & 0x3 {
		0x1 => 0x02, // maximum compression
		0x3 => 0x04, // fastest compression
		_ => 0x03,
	};
	header[9] = 0x03; // unix
	out.write_all(&header)?;
	written += GZIP_HEADER_SIZE;

	let mut raw = archive.open_raw(index)?;
	written += io::copy(&mut raw, out)?;

	out.write_u32::<LittleEndian>(entry.crc32)?;
	out.write_u32::<LittleEndian>((entry.uncompressed_size & 0xffff_ffff) as u32)?;
	written += GZIP_FOOTER_SIZE;
	Ok(written)
}
