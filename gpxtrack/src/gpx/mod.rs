//! GPX 1.1 interchange format.
//!
//! [`encode`] writes a [`SessionSnapshot`] as GPX text and [`decode`] reads it
//! back. Coordinates and elevations are written in their shortest exact
//! decimal form and times as RFC 3339 with full sub-second precision, so
//! `decode(encode(s)) == s`.
//!
//! Horizontal accuracy has no GPX element; it travels in a namespaced
//! `<extensions>` child that other readers ignore.

mod decode;
mod encode;

use thiserror::Error;

pub use decode::decode;
pub use encode::encode;

#[cfg(doc)]
use crate::session::SessionSnapshot;

/// GPX 1.1 namespace.
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// Namespace of the extension elements written by this crate.
pub const EXTENSION_NAMESPACE: &str = "https://github.com/gpxtrack/gpxtrack/xmlschemas/v1";

/// Prefix bound to [`EXTENSION_NAMESPACE`].
pub const EXTENSION_PREFIX: &str = "gpxtrack";

/// `creator` attribute of written files.
pub const CREATOR: &str = concat!("gpxtrack ", env!("CARGO_PKG_VERSION"));

/// GPX decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpxError {
    /// Structurally invalid document or unparsable value.
    #[error("malformed GPX: {0}")]
    MalformedInput(String),
}
