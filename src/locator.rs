//! Key locator (C2).
//!
//! Scans the stream for `"<key>" : [`, honoring string literals so the key
//! bytes are never matched inside an unrelated string value. When `key` is
//! empty, the first top-level `[` wins instead.

use std::io::Read;

use crate::buffer::ByteBuffer;
use crate::error::{ExtractError, Result};

/// Locate the target array and leave the buffer's cursor positioned
/// immediately after the opening `[`.
pub fn locate<R: Read>(buf: &mut ByteBuffer<R>, key: &str) -> Result<()> {
    if key.is_empty() {
        locate_top_level_array(buf)
    } else {
        locate_named_key(buf, key)
    }
}

/// Skip whitespace and any string literals; the first top-level `[` wins.
fn locate_top_level_array<R: Read>(buf: &mut ByteBuffer<R>) -> Result<()> {
    while buf.ensure_byte()? {
        let b = buf.peek();
        match b {
            b' ' | b'\t' | b'\r' | b'\n' | b':' | b',' | b'{' | b'}' => {
                buf.advance();
            }
            b'"' => {
                buf.advance();
                skip_string(buf)?;
            }
            b'[' => {
                buf.advance();
                return Ok(());
            }
            _ => {
                buf.advance();
            }
        }
    }
    Err(ExtractError::TargetNotFound { key: String::new() })
}

/// Walk the stream looking for a `"<key>"` that is not nested inside
/// another string, followed by optional whitespace, `:`, optional
/// whitespace, `[`.
fn locate_named_key<R: Read>(buf: &mut ByteBuffer<R>, key: &str) -> Result<()> {
    let key_bytes = key.as_bytes();

    while buf.ensure_byte()? {
        let b = buf.peek();
        if b == b'"' {
            buf.advance();
            let matched = match_string_contents(buf, key_bytes)?;
            if matched {
                skip_whitespace(buf)?;
                if !expect_byte(buf, b':')? {
                    continue;
                }
                skip_whitespace(buf)?;
                if expect_byte(buf, b'[')? {
                    return Ok(());
                }
            }
        } else {
            buf.advance();
        }
    }
    Err(ExtractError::TargetNotFound {
        key: key.to_string(),
    })
}

/// Consume a string's contents (cursor already past the opening quote),
/// reporting whether the contents exactly equal `expected`. EOF here means
/// the document ended before the target array was ever found — like any
/// other EOF during the search, that's `target_not_found`, not a truncated
/// element (there's no element yet to be truncated).
fn match_string_contents<R: Read>(buf: &mut ByteBuffer<R>, expected: &[u8]) -> Result<bool> {
    let mut matched_len = 0usize;
    let mut overflowed = false;
    let mut escape = false;

    loop {
        if !buf.ensure_byte()? {
            return Err(ExtractError::TargetNotFound {
                key: String::from_utf8_lossy(expected).into_owned(),
            });
        }
        let b = buf.peek();
        buf.advance();
        if escape {
            escape = false;
            overflowed = true;
            continue;
        }
        match b {
            b'\\' => escape = true,
            b'"' => break,
            _ => {
                if matched_len < expected.len() && b == expected[matched_len] {
                    matched_len += 1;
                } else {
                    overflowed = true;
                }
            }
        }
    }

    Ok(!overflowed && matched_len == expected.len())
}

/// Consume a string's contents (cursor already past the opening quote)
/// without comparing them to anything. Only called while still searching
/// for the top-level array, so EOF here is `target_not_found` too.
fn skip_string<R: Read>(buf: &mut ByteBuffer<R>) -> Result<()> {
    let mut escape = false;
    loop {
        if !buf.ensure_byte()? {
            return Err(ExtractError::TargetNotFound {
                key: String::new(),
            });
        }
        let b = buf.peek();
        buf.advance();
        if escape {
            escape = false;
            continue;
        }
        match b {
            b'\\' => escape = true,
            b'"' => return Ok(()),
            _ => {}
        }
    }
}

fn skip_whitespace<R: Read>(buf: &mut ByteBuffer<R>) -> Result<()> {
    while buf.ensure_byte()? {
        match buf.peek() {
            b' ' | b'\t' | b'\r' | b'\n' => buf.advance(),
            _ => break,
        }
    }
    Ok(())
}

/// If the next byte matches `expected`, consume it and return true.
/// Otherwise leave the cursor untouched and return false.
fn expect_byte<R: Read>(buf: &mut ByteBuffer<R>, expected: u8) -> Result<bool> {
    if !buf.ensure_byte()? {
        return Ok(false);
    }
    if buf.peek() == expected {
        buf.advance();
        Ok(true)
    } else {
        Ok(false)
    }
}
