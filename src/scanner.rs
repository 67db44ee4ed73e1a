//! Element scanner (C3).
//!
//! State machine over the stream immediately following the target array's
//! opening `[`. Pulls bytes from a [`ByteBuffer`] and emits each top-level
//! element as an owned byte sequence — owned because the live buffer slice
//! backing it is only valid until the next refill, and the caller (C4) must
//! be able to hold onto it past that point.

use std::io::Read;

use crate::buffer::ByteBuffer;
use crate::error::{ExtractError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    InPrimitive,
    InString { depth: u32 },
    InStructure { depth: u32 },
}

/// Pull one element at a time out of the array started by [`crate::locator::locate`].
pub struct ElementScanner<'r, R: Read> {
    buf: &'r mut ByteBuffer<R>,
    state: State,
    escape_next: bool,
    done: bool,
}

impl<'r, R: Read> ElementScanner<'r, R> {
    pub fn new(buf: &'r mut ByteBuffer<R>) -> Self {
        Self {
            buf,
            state: State::Between,
            escape_next: false,
            done: false,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.buf.total_read
    }

    /// Return the next element, or `None` once the array's closing `]` has
    /// been consumed.
    pub fn next_element(&mut self) -> Result<Option<Box<[u8]>>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let Some(b) = self.peek_or_eof()? else {
                return self.handle_eof();
            };

            match self.state {
                State::Between => match b {
                    b' ' | b'\t' | b'\r' | b'\n' | b',' => self.buf.advance(),
                    b']' => {
                        self.buf.advance();
                        self.done = true;
                        return Ok(None);
                    }
                    b'"' => {
                        self.buf.set_element_start();
                        self.buf.advance();
                        self.state = State::InString { depth: 0 };
                    }
                    b'{' | b'[' => {
                        self.buf.set_element_start();
                        self.buf.advance();
                        self.state = State::InStructure { depth: 1 };
                    }
                    _ => {
                        self.buf.set_element_start();
                        self.buf.advance();
                        self.state = State::InPrimitive;
                    }
                },
                State::InPrimitive => match b {
                    b',' | b']' => {
                        let start = self.buf.element_start().expect("element in progress");
                        let elem = trim_trailing_ws(self.buf.element_slice(start));
                        self.buf.clear_element_start();
                        self.state = State::Between;
                        return Ok(Some(elem));
                    }
                    _ => self.buf.advance(),
                },
                State::InString { depth } => {
                    if self.escape_next {
                        self.escape_next = false;
                        self.buf.advance();
                    } else {
                        match b {
                            b'\\' => {
                                self.escape_next = true;
                                self.buf.advance();
                            }
                            b'"' => {
                                self.buf.advance();
                                if depth == 0 {
                                    let start =
                                        self.buf.element_start().expect("element in progress");
                                    let elem = self.buf.element_slice(start).into();
                                    self.buf.clear_element_start();
                                    self.state = State::Between;
                                    return Ok(Some(elem));
                                } else {
                                    self.state = State::InStructure { depth };
                                }
                            }
                            _ => self.buf.advance(),
                        }
                    }
                }
                State::InStructure { depth } => match b {
                    b'"' => {
                        self.buf.advance();
                        self.state = State::InString { depth };
                    }
                    b'{' | b'[' => {
                        self.buf.advance();
                        self.state = State::InStructure { depth: depth + 1 };
                    }
                    b'}' | b']' => {
                        self.buf.advance();
                        let new_depth = depth - 1;
                        if new_depth == 0 {
                            let start = self.buf.element_start().expect("element in progress");
                            let elem = self.buf.element_slice(start).into();
                            self.buf.clear_element_start();
                            self.state = State::Between;
                            return Ok(Some(elem));
                        }
                        self.state = State::InStructure { depth: new_depth };
                    }
                    _ => self.buf.advance(),
                },
            }
        }
    }

    fn peek_or_eof(&mut self) -> Result<Option<u8>> {
        if self.buf.ensure_byte()? {
            Ok(Some(self.buf.peek()))
        } else {
            Ok(None)
        }
    }

    /// EOF was hit mid-scan. Only `InPrimitive` with accumulated bytes is a
    /// tolerated terminal element; everything else is `truncated_element`.
    fn handle_eof(&mut self) -> Result<Option<Box<[u8]>>> {
        match self.state {
            State::Between => Err(ExtractError::TruncatedElement {
                offset: self.buf.pos() as u64,
            }),
            State::InPrimitive => {
                let start = self.buf.element_start().expect("element in progress");
                let elem = trim_trailing_ws(self.buf.element_slice(start));
                self.buf.clear_element_start();
                self.done = true;
                Ok(Some(elem))
            }
            State::InString { .. } | State::InStructure { .. } => {
                Err(ExtractError::TruncatedElement {
                    offset: self.buf.pos() as u64,
                })
            }
        }
    }
}

fn trim_trailing_ws(bytes: &[u8]) -> Box<[u8]> {
    let end = bytes
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map_or(0, |p| p + 1);
    bytes[..end].into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;
    use std::io::Cursor;

    fn scan_all(after_bracket: &str, buffer_size: usize) -> Result<Vec<String>> {
        let mut buf = ByteBuffer::new(Cursor::new(after_bracket.as_bytes().to_vec()), buffer_size, "test");
        let mut scanner = ElementScanner::new(&mut buf);
        let mut out = Vec::new();
        while let Some(elem) = scanner.next_element()? {
            out.push(String::from_utf8(elem.into_vec()).unwrap());
        }
        Ok(out)
    }

    #[test]
    fn scenario_simple_objects() {
        let got = scan_all(r#"{"id":1},{"id":2}]"#, 4096).unwrap();
        assert_eq!(got, vec![r#"{"id":1}"#, r#"{"id":2}"#]);
    }

    #[test]
    fn scenario_mixed_types() {
        let got = scan_all(r#"1,"two",[3,4],{"k":"}"}]"#, 4096).unwrap();
        assert_eq!(got, vec!["1", "\"two\"", "[3,4]", r#"{"k":"}"}"#]);
    }

    #[test]
    fn empty_array_produces_no_elements() {
        let got = scan_all("]", 4096).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn whitespace_only_between_commas() {
        let got = scan_all("1 ,  2,3   ]", 4096).unwrap();
        assert_eq!(got, vec!["1", "2", "3"]);
    }

    #[test]
    fn tolerates_trailing_comma_before_close() {
        let got = scan_all("1,2,]", 4096).unwrap();
        assert_eq!(got, vec!["1", "2"]);
    }

    #[test]
    fn nested_depth_64_unchanged() {
        let mut s = String::new();
        for _ in 0..64 {
            s.push('[');
        }
        for _ in 0..64 {
            s.push(']');
        }
        let input = format!("{s}]");
        let got = scan_all(&input, 4096).unwrap();
        assert_eq!(got, vec![s]);
    }

    #[test]
    fn string_with_brackets_and_escapes_emitted_intact() {
        let raw = r#""a [ { \"quoted\" } ] b"]"#;
        let got = scan_all(raw, 4096).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0], r#""a [ { \"quoted\" } ] b""#);
    }

    #[test]
    fn element_longer_than_buffer_emits_unchanged() {
        let long_string = "x".repeat(500);
        let input = format!("\"{long_string}\"]");
        let got = scan_all(&input, 16).unwrap();
        assert_eq!(got, vec![format!("\"{long_string}\"")]);
    }

    #[test]
    fn eof_inside_primitive_with_bytes_is_tolerated() {
        let got = scan_all("42", 4096).unwrap();
        assert_eq!(got, vec!["42"]);
    }

    #[test]
    fn eof_inside_string_is_truncated_element() {
        let err = scan_all("\"unterminated", 4096).unwrap_err();
        assert!(matches!(err, ExtractError::TruncatedElement { .. }));
    }

    #[test]
    fn eof_inside_structure_is_truncated_element() {
        let err = scan_all("{\"a\":1", 4096).unwrap_err();
        assert!(matches!(err, ExtractError::TruncatedElement { .. }));
    }

    #[test]
    fn eof_immediately_between_elements_is_truncated() {
        let err = scan_all("1,", 4096).unwrap_err();
        assert!(matches!(err, ExtractError::TruncatedElement { .. }));
    }

    proptest::proptest! {
        /// Any sequence of integer elements round-trips through the scanner
        /// in document order, regardless of buffer size or the amount of
        /// incidental whitespace between elements.
        #[test]
        fn integers_round_trip_in_order(
            values in proptest::collection::vec(-1_000_000i64..1_000_000, 0..50),
            buffer_size in 4usize..64,
        ) {
            let body: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            let input = format!("{}]", body.join(", "));
            let got = scan_all(&input, buffer_size).unwrap();
            let expected: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            proptest::prop_assert_eq!(got, expected);
        }
    }
}
