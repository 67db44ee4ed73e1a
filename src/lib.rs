pub mod buffer;
pub mod config;
pub mod error;
pub mod extractor;
pub mod locator;
pub mod logging;
pub mod output;
pub mod parallel;
pub mod progress;
pub mod scanner;

/// Strip UTF-8 BOM (U+FEFF, bytes EF BB BF) from the beginning of a buffer.
/// Input sources are otherwise treated byte-for-byte; a leading BOM would
/// throw off the locator's first-byte assumptions.
pub fn strip_bom(buf: &mut Vec<u8>) {
    if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
        buf.drain(..3);
    }
}

/// Same idea, but for a streaming source: peeks up to 3 bytes, drops them if
/// they're a BOM, and hands back a reader that replays whatever it peeked
/// (BOM or not) ahead of the rest of the stream.
pub fn strip_bom_reader<R: std::io::Read>(
    mut reader: R,
) -> std::io::Result<std::io::Chain<std::io::Cursor<Vec<u8>>, R>> {
    use std::io::Read as _;
    let mut head = vec![0u8; 3];
    let mut filled = 0;
    while filled < head.len() {
        let n = reader.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);
    if head == [0xEF, 0xBB, 0xBF] {
        head.clear();
    }
    Ok(std::io::Cursor::new(head).chain(reader))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_bom_present() {
        let mut buf = vec![0xEF, 0xBB, 0xBF, b'"', b'h', b'i', b'"'];
        strip_bom(&mut buf);
        assert_eq!(buf, b"\"hi\"");
    }

    #[test]
    fn strip_bom_absent() {
        let mut buf = b"\"hi\"".to_vec();
        strip_bom(&mut buf);
        assert_eq!(buf, b"\"hi\"");
    }

    #[test]
    fn strip_bom_empty() {
        let mut buf = Vec::new();
        strip_bom(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn strip_bom_reader_drops_bom() {
        use std::io::{Cursor, Read};
        let mut reader = strip_bom_reader(Cursor::new(b"\xEF\xBB\xBF{\"a\":1}".to_vec())).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"{\"a\":1}");
    }

    #[test]
    fn strip_bom_reader_passes_through_without_bom() {
        use std::io::{Cursor, Read};
        let mut reader = strip_bom_reader(Cursor::new(b"{\"a\":1}".to_vec())).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"{\"a\":1}");
    }

    #[test]
    fn strip_bom_reader_handles_input_shorter_than_bom() {
        use std::io::{Cursor, Read};
        let mut reader = strip_bom_reader(Cursor::new(b"{}".to_vec())).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"{}");
    }
}
