use std::io;
use thiserror::Error;

/// Internal `Result` type alias used across `ziphttp`. Basically equal to: `Result<T, InternalError>`
pub type InternalResult<T = ()> = Result<T, InternalError>;

/// All errors manifestable within `ziphttp` collected into a neat enum
#[derive(Debug, Error)]
pub enum InternalError {
	/// thin wrapper over [io::Error](std::io::Error), captures all IO errors
	#[error("[ZiphttpError::IOError] {0}")]
	IOError(#[from] io::Error),
	/// the ZIP structure of a source could not be parsed: missing EOCD, bad record signature, truncated directory
	#[error("[ZiphttpError::MalformedArchive] {0}")]
	MalformedArchive(String),
	/// an encoder or decoder failed while processing an entry
	#[error("[ZiphttpError::CodecError] {0}")]
	CodecError(String),
	/// a compression method we can copy but not decode
	#[error("[ZiphttpError::UnsupportedMethod] cannot decode compression method {0}")]
	UnsupportedMethod(u16),
	/// a sink accepted fewer bytes than were handed to it
	#[error("[ZiphttpError::ShortWrite] wrote {written} of {expected} bytes")]
	ShortWrite {
		/// bytes the writer should have taken
		expected: u64,
		/// bytes it actually took
		written: u64,
	},
	/// invalid configuration handed in at startup: a header spec without `:`, an unparsable listen spec
	#[error("[ZiphttpError::InvalidConfig] {0}")]
	InvalidConfig(String),
	/// the named entry does not exist in the archive
	#[error("[ZiphttpError::MissingEntry] entry not found: {0}")]
	MissingEntry(String),
	/// the HTML rewriter rejected a document
	#[error("[ZiphttpError::RewriteError] {0}")]
	RewriteError(String),
}
