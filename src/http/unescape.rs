//! Percent-decoding at the transport boundary.
//!
//! The dispatcher runs the request path and every query argument value through
//! an [`Unescaper`] once, before any routing decision. Hosts can plug in their
//! own; [`PercentDecoder`] is the default.

use percent_encoding::percent_decode_str;

pub trait Unescaper: Send + Sync {
    fn unescape(&self, input: &str) -> String;
}

/// Decodes `%XX` sequences. Invalid UTF-8 is replaced, malformed escapes are
/// kept verbatim, `+` is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct PercentDecoder;

impl Unescaper for PercentDecoder {
    fn unescape(&self, input: &str) -> String {
        percent_decode_str(input).decode_utf8_lossy().into_owned()
    }
}
