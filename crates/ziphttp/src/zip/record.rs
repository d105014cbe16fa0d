//! Binary layout of the ZIP records this crate reads and writes: local file
//! headers, central directory file headers, the end-of-central-directory
//! record and the zip64 forms needed once sizes or offsets no longer fit
//! in 32 bits.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::global::error::*;

pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;
pub const EOCD64_SIGNATURE: u32 = 0x0606_4b50;
pub const EOCD64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

pub const LFH_SIZE: usize = 30;
pub const CDFH_MIN_SIZE: usize = 46;
pub const EOCD_SIZE: usize = 22;

/// general purpose bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;

/// One member of an archive, as parsed from (or destined for) the central directory.
#[derive(Debug, Clone)]
pub struct ZipEntry {
	/// archive-relative name, `/` separated
	pub name: String,
	/// compression method id, see [`method`](crate::global::codec::method)
	pub method: u16,
	/// general purpose bit flags
	pub flags: u16,
	/// CRC-32 (IEEE) of the uncompressed content
	pub crc32: u32,
	pub compressed_size: u64,
	pub uncompressed_size: u64,
	/// modification time at seconds resolution
	pub modified: DateTime<Utc>,
	/// entry comment, doubles as a MIME-type hint for the server
	pub comment: String,
	/// offset of the local file header, absolute within the container
	pub header_offset: u64,
}

impl ZipEntry {
	pub fn is_dir(&self) -> bool {
		self.name.ends_with('/')
	}

	pub fn is_encrypted(&self) -> bool {
		self.flags & FLAG_ENCRYPTED != 0
	}
}

/// MS-DOS date/time pair, 2 second resolution, as stored in ZIP records.
pub fn to_dos_time(t: DateTime<Utc>) -> (u16, u16) {
	let year = t.year().clamp(1980, 2107) as u16;
	let date = ((year - 1980) << 9) | ((t.month() as u16) << 5) | t.day() as u16;
	let time = ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | (t.second() as u16 / 2);
	(time, date)
}

/// Inverse of [`to_dos_time`]. Unrepresentable values collapse to the epoch.
pub fn from_dos_time(time: u16, date: u16) -> DateTime<Utc> {
	let year = ((date >> 9) & 0x7f) as i32 + 1980;
	let month = ((date >> 5) & 0x0f) as u32;
	let day = (date & 0x1f) as u32;
	let hour = ((time >> 11) & 0x1f) as u32;
	let minute = ((time >> 5) & 0x3f) as u32;
	let second = ((time & 0x1f) * 2) as u32;
	NaiveDate::from_ymd_opt(year, month, day)
		.and_then(|d| d.and_hms_opt(hour, minute, second))
		.map(|dt| Utc.from_utc_datetime(&dt))
		.unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

fn needs_zip64(entry: &ZipEntry) -> bool {
	entry.compressed_size > u32::MAX as u64
		|| entry.uncompressed_size > u32::MAX as u64
		|| entry.header_offset > u32::MAX as u64
}

fn clamp32(v: u64) -> u32 {
	if v > u32::MAX as u64 {
		u32::MAX
	} else {
		v as u32
	}
}

/// Serializes the local file header for `entry` into `out`.
pub fn write_local_header(out: &mut dyn Write, entry: &ZipEntry) -> InternalResult {
	let (time, date) = to_dos_time(entry.modified);
	let zip64 = entry.compressed_size > u32::MAX as u64 || entry.uncompressed_size > u32::MAX as u64;

	out.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
	out.write_u16::<LittleEndian>(if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT })?;
	out.write_u16::<LittleEndian>(entry.flags)?;
	out.write_u16::<LittleEndian>(entry.method)?;
	out.write_u16::<LittleEndian>(time)?;
	out.write_u16::<LittleEndian>(date)?;
	out.write_u32::<LittleEndian>(entry.crc32)?;
	out.write_u32::<LittleEndian>(clamp32(entry.compressed_size))?;
	out.write_u32::<LittleEndian>(clamp32(entry.uncompressed_size))?;
	out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
	if zip64 {
		out.write_u16::<LittleEndian>(20)?; // extra length: one zip64 field
	} else {
		out.write_u16::<LittleEndian>(0)?;
	}
	out.write_all(entry.name.as_bytes())?;
	if zip64 {
		out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
		out.write_u16::<LittleEndian>(16)?;
		out.write_u64::<LittleEndian>(entry.uncompressed_size)?;
		out.write_u64::<LittleEndian>(entry.compressed_size)?;
	}
	Ok(())
}

/// Byte length [`write_local_header`] will produce for `entry`.
pub fn local_header_len(entry: &ZipEntry) -> u64 {
	let zip64 = entry.compressed_size > u32::MAX as u64 || entry.uncompressed_size > u32::MAX as u64;
	LFH_SIZE as u64 + entry.name.len() as u64 + if zip64 { 20 } else { 0 }
}

/// Serializes the central directory record for `entry` into `out`.
pub fn write_central_header(out: &mut dyn Write, entry: &ZipEntry) -> InternalResult {
	let (time, date) = to_dos_time(entry.modified);
	let zip64 = needs_zip64(entry);

	let mut extra = Vec::new();
	if zip64 {
		let mut body = Vec::new();
		if entry.uncompressed_size > u32::MAX as u64 {
			body.write_u64::<LittleEndian>(entry.uncompressed_size)?;
		}
		if entry.compressed_size > u32::MAX as u64 {
			body.write_u64::<LittleEndian>(entry.compressed_size)?;
		}
		if entry.header_offset > u32::MAX as u64 {
			body.write_u64::<LittleEndian>(entry.header_offset)?;
		}
		extra.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
		extra.write_u16::<LittleEndian>(body.len() as u16)?;
		extra.extend_from_slice(&body);
	}

	out.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
	out.write_u16::<LittleEndian>(if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT })?; // version made by
	out.write_u16::<LittleEndian>(if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT })?; // version needed
	out.write_u16::<LittleEndian>(entry.flags)?;
	out.write_u16::<LittleEndian>(entry.method)?;
	out.write_u16::<LittleEndian>(time)?;
	out.write_u16::<LittleEndian>(date)?;
	out.write_u32::<LittleEndian>(entry.crc32)?;
	out.write_u32::<LittleEndian>(clamp32(entry.compressed_size))?;
	out.write_u32::<LittleEndian>(clamp32(entry.uncompressed_size))?;
	out.write_u16::<LittleEndian>(entry.name.len() as u16)?;
	out.write_u16::<LittleEndian>(extra.len() as u16)?;
	out.write_u16::<LittleEndian>(entry.comment.len() as u16)?;
	out.write_u16::<LittleEndian>(0)?; // disk number start
	out.write_u16::<LittleEndian>(0)?; // internal attributes
	out.write_u32::<LittleEndian>(0)?; // external attributes
	out.write_u32::<LittleEndian>(clamp32(entry.header_offset))?;
	out.write_all(entry.name.as_bytes())?;
	out.write_all(&extra)?;
	out.write_all(entry.comment.as_bytes())?;
	Ok(())
}

/// Parses one central directory record from `cursor`, leaving it positioned
/// at the next record.
pub fn read_central_header(cursor: &mut Cursor<&[u8]>) -> InternalResult<ZipEntry> {
	let signature = cursor.read_u32::<LittleEndian>()?;
	if signature != CDFH_SIGNATURE {
		return Err(InternalError::MalformedArchive(format!(
			"bad central directory signature: {:#010x}",
			signature
		)));
	}
	let _version_made_by = cursor.read_u16::<LittleEndian>()?;
	let _version_needed = cursor.read_u16::<LittleEndian>()?;
	let flags = cursor.read_u16::<LittleEndian>()?;
	let method = cursor.read_u16::<LittleEndian>()?;
	let mod_time = cursor.read_u16::<LittleEndian>()?;
	let mod_date = cursor.read_u16::<LittleEndian>()?;
	let crc32 = cursor.read_u32::<LittleEndian>()?;
	let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
	let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
	let name_len = cursor.read_u16::<LittleEndian>()? as usize;
	let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
	let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
	let _disk_start = cursor.read_u16::<LittleEndian>()?;
	let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
	let _external_attrs = cursor.read_u32::<LittleEndian>()?;
	let mut header_offset = cursor.read_u32::<LittleEndian>()? as u64;

	let mut name_bytes = vec![0u8; name_len];
	cursor.read_exact(&mut name_bytes)?;
	let name = String::from_utf8_lossy(&name_bytes).into_owned();

	// zip64 extended information, present only for overflowed fields
	let extra_end = cursor.position() + extra_len as u64;
	while cursor.position() + 4 <= extra_end {
		let header_id = cursor.read_u16::<LittleEndian>()?;
		let field_size = cursor.read_u16::<LittleEndian>()? as u64;
		let field_end = cursor.position() + field_size;
		if header_id == ZIP64_EXTRA_ID {
			if uncompressed_size == u32::MAX as u64 && cursor.position() + 8 <= field_end {
				uncompressed_size = cursor.read_u64::<LittleEndian>()?;
			}
			if compressed_size == u32::MAX as u64 && cursor.position() + 8 <= field_end {
				compressed_size = cursor.read_u64::<LittleEndian>()?;
			}
			if header_offset == u32::MAX as u64 && cursor.position() + 8 <= field_end {
				header_offset = cursor.read_u64::<LittleEndian>()?;
			}
		}
		cursor.set_position(field_end);
	}
	cursor.set_position(extra_end);

	let mut comment_bytes = vec![0u8; comment_len];
	cursor.read_exact(&mut comment_bytes)?;
	let comment = String::from_utf8_lossy(&comment_bytes).into_owned();

	Ok(ZipEntry {
		name,
		method,
		flags,
		crc32,
		compressed_size,
		uncompressed_size,
		modified: from_dos_time(mod_time, mod_date),
		comment,
		header_offset,
	})
}

/// End of central directory record, after zip64 resolution.
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDirectory {
	pub entries: u64,
	pub directory_size: u64,
	pub directory_offset: u64,
}

impl EndOfCentralDirectory {
	/// Parses the plain EOCD found at `buf[pos..]`. The second value reports
	/// whether any field carries a zip64 sentinel and the real record must be
	/// read with [`parse_zip64`](Self::parse_zip64).
	pub fn parse_plain(buf: &[u8], pos: usize) -> InternalResult<(EndOfCentralDirectory, bool)> {
		if buf.len() < pos + EOCD_SIZE {
			return Err(InternalError::MalformedArchive("truncated end of central directory".into()));
		}
		let mut cursor = Cursor::new(&buf[pos + 4..]);
		let _disk = cursor.read_u16::<LittleEndian>()?;
		let _cd_disk = cursor.read_u16::<LittleEndian>()?;
		let _disk_entries = cursor.read_u16::<LittleEndian>()?;
		let entries = cursor.read_u16::<LittleEndian>()? as u64;
		let directory_size = cursor.read_u32::<LittleEndian>()? as u64;
		let directory_offset = cursor.read_u32::<LittleEndian>()? as u64;

		let zip64 = entries == u16::MAX as u64
			|| directory_size == u32::MAX as u64
			|| directory_offset == u32::MAX as u64;
		Ok((
			EndOfCentralDirectory {
				entries,
				directory_size,
				directory_offset,
			},
			zip64,
		))
	}

	/// Parses the zip64 EOCD record at `buf[pos..]`.
	pub fn parse_zip64(buf: &[u8], pos: usize) -> InternalResult<EndOfCentralDirectory> {
		if buf.len() < pos + 56 {
			return Err(InternalError::MalformedArchive("truncated zip64 end of central directory".into()));
		}
		let mut cursor = Cursor::new(&buf[pos..]);
		let signature = cursor.read_u32::<LittleEndian>()?;
		if signature != EOCD64_SIGNATURE {
			return Err(InternalError::MalformedArchive("zip64 end of central directory not found".into()));
		}
		let _record_size = cursor.read_u64::<LittleEndian>()?;
		let _version_made_by = cursor.read_u16::<LittleEndian>()?;
		let _version_needed = cursor.read_u16::<LittleEndian>()?;
		let _disk = cursor.read_u32::<LittleEndian>()?;
		let _cd_disk = cursor.read_u32::<LittleEndian>()?;
		let _disk_entries = cursor.read_u64::<LittleEndian>()?;
		let entries = cursor.read_u64::<LittleEndian>()?;
		let directory_size = cursor.read_u64::<LittleEndian>()?;
		let directory_offset = cursor.read_u64::<LittleEndian>()?;
		Ok(EndOfCentralDirectory {
			entries,
			directory_size,
			directory_offset,
		})
	}

	/// Writes the EOCD (and the zip64 pair when required) for a directory of
	/// `entries` records spanning `[directory_offset, directory_offset + directory_size)`.
	pub fn write(&self, out: &mut dyn Write, position: u64) -> InternalResult {
		let zip64 = self.entries > u16::MAX as u64
			|| self.directory_size > u32::MAX as u64
			|| self.directory_offset > u32::MAX as u64;
		if zip64 {
			out.write_u32::<LittleEndian>(EOCD64_SIGNATURE)?;
			out.write_u64::<LittleEndian>(44)?;
			out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
			out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
			out.write_u32::<LittleEndian>(0)?;
			out.write_u32::<LittleEndian>(0)?;
			out.write_u64::<LittleEndian>(self.entries)?;
			out.write_u64::<LittleEndian>(self.entries)?;
			out.write_u64::<LittleEndian>(self.directory_size)?;
			out.write_u64::<LittleEndian>(self.directory_offset)?;

			out.write_u32::<LittleEndian>(EOCD64_LOCATOR_SIGNATURE)?;
			out.write_u32::<LittleEndian>(0)?;
			out.write_u64::<LittleEndian>(position)?;
			out.write_u32::<LittleEndian>(1)?;
		}
		out.write_u32::<LittleEndian>(EOCD_SIGNATURE)?;
		out.write_u16::<LittleEndian>(0)?;
		out.write_u16::<LittleEndian>(0)?;
		out.write_u16::<LittleEndian>(self.entries.min(u16::MAX as u64) as u16)?;
		out.write_u16::<LittleEndian>(self.entries.min(u16::MAX as u64) as u16)?;
		out.write_u32::<LittleEndian>(clamp32(self.directory_size))?;
		out.write_u32::<LittleEndian>(clamp32(self.directory_offset))?;
		out.write_u16::<LittleEndian>(0)?; // no comment
		Ok(())
	}
}
