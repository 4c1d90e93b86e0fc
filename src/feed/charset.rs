//! Charset hook used by the feed decoder.
//!
//! Feeds declare their encoding in the XML prolog. Before the event reader
//! runs, the raw bytes are handed to a [`CharsetDecoder`] keyed by that
//! declared name, which must return UTF-8. Only a small allow-list is
//! supported; there is no detection or best-effort fallback.

use std::borrow::Cow;

use encoding_rs::WINDOWS_1251;
use thiserror::Error;

/// Errors produced by a charset hook.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CharsetError {
    /// The document declared an encoding outside the supported set.
    #[error("unsupported charset: {0}")]
    Unsupported(String),
}

/// Converts a document in a declared encoding into UTF-8 bytes.
///
/// Implementations are injected into [`parse_feed_with`](super::parse_feed_with)
/// so callers can widen or narrow the set of accepted encodings.
pub trait CharsetDecoder: Send + Sync {
    /// Returns `input` re-encoded as UTF-8.
    ///
    /// `label` is the encoding name exactly as declared, possibly empty when
    /// the document has no declaration.
    fn decode<'a>(&self, label: &str, input: &'a [u8]) -> Result<Cow<'a, [u8]>, CharsetError>;
}

const UTF8_LABELS: &[&str] = &["utf-8", ""];
const WINDOWS_1251_LABELS: &[&str] = &["windows-1251"];

/// The built-in allow-list: UTF-8 (or no declaration) and windows-1251.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCharsets;

impl CharsetDecoder for DefaultCharsets {
    fn decode<'a>(&self, label: &str, input: &'a [u8]) -> Result<Cow<'a, [u8]>, CharsetError> {
        if is_charset(label, UTF8_LABELS) {
            return Ok(Cow::Borrowed(input));
        }

        if is_charset(label, WINDOWS_1251_LABELS) {
            // Every byte maps to a code point in windows-1251, so replacement
            // characters only appear for the single unassigned slot.
            let (text, had_errors) = WINDOWS_1251.decode_without_bom_handling(input);
            if had_errors {
                tracing::debug!(charset = label, "Replaced unmappable bytes while transcoding");
            }
            return Ok(Cow::Owned(text.into_owned().into_bytes()));
        }

        Err(CharsetError::Unsupported(label.to_string()))
    }
}

fn is_charset(label: &str, names: &[&str]) -> bool {
    let label = label.trim();
    names.iter().any(|name| label.eq_ignore_ascii_case(name))
}
