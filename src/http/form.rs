//! Streaming `application/x-www-form-urlencoded` body parser.
//!
//! Body chunks may split a field anywhere, including inside a `%XX` escape.
//! Complete `key=value` pairs (terminated by `&`) are decoded as soon as they
//! arrive; the unterminated tail waits until the next chunk or
//! [`FormParser::finish`]. The transport's body limit bounds the tail.

use thiserror::Error;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A `%` not followed by two hex digits.
    #[error("malformed percent escape in form field `{field}`")]
    MalformedEscape { field: String },
}

/// Whether a `Content-Type` value names the form encoding (parameters ignored).
pub fn is_form_encoded(content_type: &str) -> bool {
    content_type
        .get(..FORM_URLENCODED.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FORM_URLENCODED))
}

#[derive(Debug, Default)]
pub struct FormParser {
    pending: Vec<u8>,
}

impl FormParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next body chunk, emitting every completed field.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        emit: &mut impl FnMut(String, String),
    ) -> Result<(), FormError> {
        self.pending.extend_from_slice(chunk);

        let Some(last_amp) = self.pending.iter().rposition(|&b| b == b'&') else {
            return Ok(());
        };
        let fields: Vec<u8> = self.pending.drain(..=last_amp).collect();
        emit_fields(&fields[..last_amp], emit)
    }

    /// Emit the final, unterminated field.
    pub fn finish(self, emit: &mut impl FnMut(String, String)) -> Result<(), FormError> {
        emit_fields(&self.pending, emit)
    }
}

/// Fields before a malformed one are still emitted.
fn emit_fields(input: &[u8], emit: &mut impl FnMut(String, String)) -> Result<(), FormError> {
    for field in input.split(|&b| b == b'&').filter(|field| !field.is_empty()) {
        if has_bad_escape(field) {
            let name = field.split(|&b| b == b'=').next().unwrap_or_default();
            return Err(FormError::MalformedEscape {
                field: String::from_utf8_lossy(name).into_owned(),
            });
        }
        for (key, value) in url::form_urlencoded::parse(field) {
            emit(key.into_owned(), value.into_owned());
        }
    }
    Ok(())
}

fn has_bad_escape(field: &[u8]) -> bool {
    field.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !matches!(
                field.get(i + 1..i + 3),
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
            )
    })
}
