use std::io::{self, Read, Write};

use brotli;
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use zopfli;
use zstd;

use crate::global::error::*;

/// ZIP compression method ids. Everything outside [`decodable`](is_decodable) is pass-through only.
pub mod method {
	/// no compression
	pub const STORE: u16 = 0;
	/// raw DEFLATE
	pub const DEFLATE: u16 = 8;
	pub const BZIP2: u16 = 12;
	pub const LZMA: u16 = 14;
	/// brotli, as registered by the archive builder
	pub const BROTLI: u16 = 91;
	/// zstandard
	pub const ZSTD: u16 = 93;
	pub const MP3: u16 = 94;
	pub const XZ: u16 = 95;
	pub const JPEG: u16 = 96;
	pub const WAVPACK: u16 = 97;
}

/// Whether the registry can turn the given method back into plain bytes.
pub fn is_decodable(m: u16) -> bool {
	matches!(m, method::STORE | method::DEFLATE | method::BROTLI | method::ZSTD)
}

const BROTLI_QUALITY: u32 = 9;
const BROTLI_LGWIN: u32 = 21;

/// Which DEFLATE encoder to use. Both produce bitstreams any ZIP reader inflates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeflateProfile {
	/// zopfli: buffers the whole input, much denser output, much slower
	#[default]
	Zopfli,
	/// streaming flate2 encoder
	Normal,
}

/// Encoder half of the codec registry: drains a read handle into `output`
/// using the requested ZIP method.
pub struct Compressor<T: Read> {
	data: T,
}

impl<T: Read> Compressor<T> {
	/// Construct a new compressor over a read handle
	pub fn new(data: T) -> Compressor<T> {
		Compressor { data }
	}

	/// Compress everything from the handle into `output` with `method`.
	pub fn compress(&mut self, m: u16, profile: DeflateProfile, output: &mut dyn Write) -> InternalResult {
		match m {
			method::STORE => {
				io::copy(&mut self.data, output)?;
				Ok(())
			},
			method::DEFLATE => match profile {
				DeflateProfile::Normal => {
					let mut encoder = DeflateEncoder::new(&mut self.data, Compression::default());
					io::copy(&mut encoder, output)?;
					Ok(())
				},
				DeflateProfile::Zopfli => {
					zopfli::compress(zopfli::Options::default(), zopfli::Format::Deflate, &mut self.data, output)
						.map_err(|e| InternalError::CodecError(format!("zopfli: {}", e)))?;
					Ok(())
				},
			},
			method::BROTLI => {
				let mut encoder = brotli::CompressorReader::new(&mut self.data, 4096, BROTLI_QUALITY, BROTLI_LGWIN);
				io::copy(&mut encoder, output)?;
				Ok(())
			},
			method::ZSTD => {
				let mut encoder = zstd::stream::read::Encoder::new(&mut self.data, 0)
					.map_err(|e| InternalError::CodecError(format!("zstd: {}", e)))?;
				io::copy(&mut encoder, output)?;
				Ok(())
			},
			other => Err(InternalError::UnsupportedMethod(other)),
		}
	}
}

/// Decoder half of the registry. The reader is chosen at entry-open time by
/// method id, there is no state shared with any archive handle.
pub fn decoder<'a>(m: u16, input: Box<dyn Read + 'a>) -> InternalResult<Box<dyn Read + 'a>> {
	match m {
		method::STORE => Ok(input),
		method::DEFLATE => Ok(Box::new(DeflateDecoder::new(input))),
		method::BROTLI => Ok(Box::new(brotli::Decompressor::new(input, 4096))),
		method::ZSTD => {
			let decoder =
				zstd::stream::read::Decoder::new(input).map_err(|e| InternalError::CodecError(format!("zstd: {}", e)))?;
			Ok(Box::new(decoder))
		},
		other => Err(InternalError::UnsupportedMethod(other)),
	}
}

/// Read adapter that feeds the IEEE CRC-32 and counts bytes as they pass.
pub struct Crc32Reader<T: Read> {
	inner: T,
	hasher: crc32fast::Hasher,
	count: u64,
}

impl<T: Read> Crc32Reader<T> {
	pub fn new(inner: T) -> Crc32Reader<T> {
		Crc32Reader {
			inner,
			hasher: crc32fast::Hasher::new(),
			count: 0,
		}
	}

	/// CRC-32 and byte count of everything read so far.
	pub fn digest(&self) -> (u32, u64) {
		(self.hasher.clone().finalize(), self.count)
	}
}

impl<T: Read> Read for Crc32Reader<T> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let n = self.inner.read(buf)?;
		self.hasher.update(&buf[..n]);
		self.count += n as u64;
		Ok(n)
	}
}

/// Write adapter mirroring [`Crc32Reader`] for sinks.
pub struct Crc32Writer<T: Write> {
	inner: T,
	hasher: crc32fast::Hasher,
	count: u64,
}

impl<T: Write> Crc32Writer<T> {
	pub fn new(inner: T) -> Crc32Writer<T> {
		Crc32Writer {
			inner,
			hasher: crc32fast::Hasher::new(),
			count: 0,
		}
	}

	/// CRC-32 and byte count of everything written so far.
	pub fn digest(&self) -> (u32, u64) {
		(self.hasher.clone().finalize(), self.count)
	}
}

impl<T: Write> Write for Crc32Writer<T> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let n = self.inner.write(buf)?;
		self.hasher.update(&buf[..n]);
		self.count += n as u64;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.inner.flush()
	}
}

/// One-shot helper for the build workers: compress `input` fully, returning
/// the payload plus the CRC-32 and length of the original bytes.
pub fn compress_entry(input: impl Read, m: u16, profile: DeflateProfile) -> InternalResult<(Vec<u8>, u32, u64)> {
	let mut counter = Crc32Reader::new(input);
	let mut out = Vec::new();
	Compressor::new(&mut counter).compress(m, profile, &mut out)?;
	let (crc, size) = counter.digest();
	Ok((out, crc, size))
}
