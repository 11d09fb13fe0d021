//! UTF-8 aware character source for the tokenizer.
//!
//! Decodes one code point at a time from a buffered byte stream and keeps
//! at most one character of pushback. Invalid sequences decode to
//! U+FFFD instead of failing the stream.

use std::char::REPLACEMENT_CHARACTER;
use std::io::{self, BufReader, Read};

pub(crate) struct CharSource<R> {
    inner: BufReader<R>,
    pending: Option<char>,
    pending_byte: Option<u8>,
    capture: Option<String>,
}

impl<R: Read> CharSource<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: None,
            pending_byte: None,
            capture: None,
        }
    }

    /// Returns the next character, or `None` at end of stream.
    pub(crate) fn next_char(&mut self) -> io::Result<Option<char>> {
        if let Some(c) = self.pending.take() {
            return Ok(Some(c));
        }
        let decoded = self.decode()?;
        if let (Some(c), Some(buf)) = (decoded, self.capture.as_mut()) {
            buf.push(c);
        }
        Ok(decoded)
    }

    /// Puts `c` back so the next [`next_char`](Self::next_char) returns it.
    pub(crate) fn push_back(&mut self, c: char) {
        debug_assert!(self.pending.is_none(), "only one char of pushback");
        self.pending = Some(c);
    }

    pub(crate) fn set_capture(&mut self, enabled: bool) {
        self.capture = enabled.then(String::new);
    }

    /// Returns the raw text read since the previous call. A pushed-back
    /// character belongs to the next token and is carried over.
    pub(crate) fn take_capture(&mut self) -> Option<String> {
        let buf = self.capture.as_mut()?;
        let mut taken = std::mem::take(buf);
        if let Some(c) = self.pending {
            if taken.ends_with(c) {
                taken.pop();
                buf.push(c);
            }
        }
        Some(taken)
    }

    fn decode(&mut self) -> io::Result<Option<char>> {
        let Some(lead) = self.read_byte()? else {
            return Ok(None);
        };
        let width = match lead {
            0x00..=0x7F => return Ok(Some(char::from(lead))),
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Ok(Some(REPLACEMENT_CHARACTER)),
        };

        let mut buf = [lead, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            match self.read_byte()? {
                Some(b) if b & 0xC0 == 0x80 => *slot = b,
                Some(b) => {
                    // Not a continuation byte: it starts the next char.
                    self.pending_byte = Some(b);
                    return Ok(Some(REPLACEMENT_CHARACTER));
                }
                None => return Ok(Some(REPLACEMENT_CHARACTER)),
            }
        }

        Ok(Some(
            std::str::from_utf8(&buf[..width])
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(REPLACEMENT_CHARACTER),
        ))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pending_byte.take() {
            return Ok(Some(b));
        }
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars_of(bytes: &[u8]) -> Vec<char> {
        let mut source = CharSource::new(bytes);
        let mut out = Vec::new();
        while let Some(c) = source.next_char().expect("read") {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_next_char_decodes_multibyte_sequences() {
        let text = "aé€𝄞";
        assert_eq!(chars_of(text.as_bytes()), text.chars().collect::<Vec<_>>());
    }

    #[test]
    fn test_next_char_invalid_lead_byte_is_replacement() {
        assert_eq!(chars_of(&[0xFF, b'a']), vec![REPLACEMENT_CHARACTER, 'a']);
    }

    #[test]
    fn test_next_char_truncated_sequence_keeps_following_byte() {
        // 0xC3 expects a continuation byte but gets 'x'.
        assert_eq!(chars_of(&[0xC3, b'x']), vec![REPLACEMENT_CHARACTER, 'x']);
    }

    #[test]
    fn test_push_back_returns_char_once() {
        let mut source = CharSource::new(&b"ab"[..]);
        let a = source.next_char().expect("read").expect("char");
        source.push_back(a);
        assert_eq!(source.next_char().expect("read"), Some('a'));
        assert_eq!(source.next_char().expect("read"), Some('b'));
        assert_eq!(source.next_char().expect("read"), None);
    }

    #[test]
    fn test_take_capture_carries_pushed_back_char() {
        let mut source = CharSource::new(&b"ab<c"[..]);
        source.set_capture(true);
        for _ in 0..3 {
            source.next_char().expect("read");
        }
        source.push_back('<');
        assert_eq!(source.take_capture().as_deref(), Some("ab"));
        source.next_char().expect("read");
        source.next_char().expect("read");
        assert_eq!(source.take_capture().as_deref(), Some("<c"));
    }
}
