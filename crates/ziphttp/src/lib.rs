/*!
Pack a directory tree (or merge existing archives) into one ZIP file that
doubles as a live web root: the bundled server maps URL paths straight to
archive entries and streams their pre-compressed bodies whenever the
client's `Accept-Encoding` allows, without re-encoding on the hot path.

### How the pieces fit
- `builder`: parallel work-queue pipeline turning directories, files and
  sibling ZIPs into a single archive, with per-name variant selection,
  optional HTML link rewriting, zopfli/brotli/zstd codecs and an optional
  self-executable prefix.
- `server`: indexes an archive once (`name -> method -> entry`), then
  answers each request from the raw ZIP payloads; a deflated entry becomes
  a gzip response by adding 18 bytes of framing.
- `archive`: the underlying ZIP reader/writer, the archive offset locator
  and the gzip bridge.

### Quick taste

```no_run
use ziphttp::builder::{build, BuildOptions};

let options = BuildOptions {
	strip_root: true,
	..Default::default()
};
build(std::path::Path::new("site.zip"), &["public".to_string()], false, &options, None).unwrap();
```
*/

mod tests;

pub(crate) mod global;
pub(crate) mod util;
pub(crate) mod zip;

pub(crate) mod build;
pub(crate) mod serve;

/// Environment variable naming the default archive.
pub const ENV_ARCHIVE: &str = "ZIPHTTP_ARCHIVE";
/// Environment variable selecting the running executable as the archive.
pub const ENV_SELF: &str = "ZIPHTTP_SELF";

/// ZIP container access: reader, writer, records and the offset locator.
pub mod archive {
	pub use crate::global::codec::{
		compress_entry, decoder, is_decodable, method, Compressor, Crc32Reader, Crc32Writer, DeflateProfile,
	};
	pub use crate::global::error::{InternalError, InternalResult};
	pub use crate::global::gzip::{copy_gzip, GZIP_FOOTER_SIZE, GZIP_HEADER_SIZE};
	pub use crate::zip::offset::archive_offset;
	pub use crate::zip::reader::{RawReader, ZipArchive, ZipSource};
	pub use crate::zip::record::{from_dos_time, to_dos_time, ZipEntry, FLAG_ENCRYPTED};
	pub use crate::zip::writer::{EntryHeader, ZipWriter};
}

/// Archive creation: the pipeline, the variant chooser, link rewriting and
/// the sitemap decision.
pub mod builder {
	pub use crate::build::chooser::{choose_from, choose_from_last, choose_from_nocrc, ChooseFile, ChooseSource};
	pub use crate::build::link::{fix_link, link_relative};
	pub use crate::build::sitemap::SiteMap;
	pub use crate::build::{build, prepare_output, BuildOptions, SortBy};
	pub use crate::global::error::{InternalError, InternalResult};
}

/// The HTTP serving engine and its lifecycle.
pub mod server {
	pub use crate::serve::handler::{HandlerConfig, HandlerSources, ZipHandler};
	pub use crate::serve::http::{http_date, parse_http_date, Request, ResponseWriter, Timeouts};
	pub use crate::serve::index::{build_index, ArchiveSet};
	pub use crate::serve::{run, ServeOptions};
}

/// Small path and pattern helpers shared by the builder and the CLI.
pub mod pathutil {
	pub use crate::util::{basename, collapse_slashes, ismatch, parse_duration, relative_path};
}
