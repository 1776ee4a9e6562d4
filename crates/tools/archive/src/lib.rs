//! Archive decompressors for repofetch.
//!
//! Every decompressor unpacks into a staging directory next to the
//! repository directory, applies the rule's strip prefix there, and only then
//! moves entries into place. Entries that would land outside the repository
//! (absolute paths, `..` components, escaping symlinks) fail the fetch
//! persistently.
//!
//! [`DecompressorRegistry`] is the usual entry point: it detects the format
//! and dispatches to [`TarDecompressor`] or [`ZipDecompressor`].

pub mod detect;
pub mod registry;
pub mod staging;
pub mod tarball;
pub mod zipfile;

pub use detect::{detect_format, sniff};
pub use registry::DecompressorRegistry;
pub use tarball::TarDecompressor;
pub use zipfile::ZipDecompressor;
