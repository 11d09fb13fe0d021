//! Pull tokenizer for the XMPP byte stream.
//!
//! [`XmlReader`] turns an endless XML document into [`Token`]s one call at
//! a time. It is not a conforming XML parser: it understands exactly the
//! subset XMPP servers emit and is deliberately forgiving of anything
//! else.
//!
//! # Lexical rules
//!
//! - Whitespace before a tag or a text run is skipped. Text made only of
//!   whitespace produces no token.
//! - `<?...>` and `<!...>` are skipped whole.
//! - Tag names end at whitespace, `>` or `/`. Attribute values may be
//!   quoted with `'` or `"`.
//! - `<name/>` yields a `StartTag` followed by an `EndTag` of the same name.
//! - Entities are decoded lossily by their first letter: `&l..;` is `<`,
//!   `&g..;` is `>`, `&am..;` is `&`, any other `&a..;` is `'`, `&q..;`
//!   is `"`, `&n..;` is a space and anything else is `?`.
//! - In text, a backslash escapes the following character. `\<` ends the
//!   text run and the `<` is kept for the next token.
//! - End of input yields [`Token::EndOfStream`], forever after.

use std::io::Read;

use crate::chars::CharSource;
use crate::{ProtocolError, StartTag, Token};

/// Streaming tokenizer over any byte source.
pub struct XmlReader<R> {
    source: CharSource<R>,
    pending_end: Option<String>,
    finished: bool,
}

impl<R: Read> XmlReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            source: CharSource::new(inner),
            pending_end: None,
            finished: false,
        }
    }

    /// Reads the next token, blocking until one is complete.
    pub fn next_token(&mut self) -> Result<Token, ProtocolError> {
        if let Some(name) = self.pending_end.take() {
            return Ok(Token::EndTag(name));
        }
        if self.finished {
            return Ok(Token::EndOfStream);
        }

        loop {
            let Some(c) = self.skip_whitespace()? else {
                return Ok(self.finish());
            };

            if c != '<' {
                self.source.push_back(c);
                let text = self.read_text()?;
                if text.is_empty() {
                    continue;
                }
                return Ok(Token::Text(text));
            }

            let Some(c) = self.source.next_char()? else {
                return Ok(self.finish());
            };
            match c {
                '/' => return self.read_end_tag(),
                '?' | '!' => self.skip_past('>')?,
                _ => return self.read_start_tag(c),
            }
        }
    }

    /// Reads tokens until the next child start tag of the element being
    /// consumed. Returns `None` at the element's end tag. Text between
    /// children is discarded.
    pub fn next_child(
        &mut self,
        parent: &str,
    ) -> Result<Option<StartTag>, ProtocolError> {
        loop {
            match self.next_token()? {
                Token::StartTag(tag) => return Ok(Some(tag)),
                Token::EndTag(_) => return Ok(None),
                Token::Text(_) => {}
                Token::EndOfStream => {
                    return Err(ProtocolError::UnexpectedEof(parent.to_owned()));
                }
            }
        }
    }

    /// Consumes the rest of an element whose start tag was just read,
    /// including all nested children.
    pub fn skip_element(&mut self, name: &str) -> Result<(), ProtocolError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_token()? {
                Token::StartTag(_) => depth += 1,
                Token::EndTag(_) => depth -= 1,
                Token::Text(_) => {}
                Token::EndOfStream => {
                    return Err(ProtocolError::UnexpectedEof(name.to_owned()));
                }
            }
        }
        Ok(())
    }

    /// Consumes the rest of an element whose start tag was just read and
    /// returns all of its text, nested text included, concatenated.
    pub fn element_text(&mut self, name: &str) -> Result<String, ProtocolError> {
        let mut text = String::new();
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_token()? {
                Token::Text(run) => text.push_str(&run),
                Token::StartTag(_) => depth += 1,
                Token::EndTag(_) => depth -= 1,
                Token::EndOfStream => {
                    return Err(ProtocolError::UnexpectedEof(name.to_owned()));
                }
            }
        }
        Ok(text)
    }

    /// Starts or stops recording the raw characters consumed.
    pub fn set_capture(&mut self, enabled: bool) {
        self.source.set_capture(enabled);
    }

    /// Returns the raw input consumed since the previous call, if
    /// capturing is enabled.
    pub fn take_capture(&mut self) -> Option<String> {
        self.source.take_capture()
    }

    fn finish(&mut self) -> Token {
        self.finished = true;
        Token::EndOfStream
    }

    fn skip_whitespace(&mut self) -> Result<Option<char>, ProtocolError> {
        while let Some(c) = self.source.next_char()? {
            if c > ' ' {
                return Ok(Some(c));
            }
        }
        Ok(None)
    }

    fn skip_past(&mut self, end: char) -> Result<(), ProtocolError> {
        while let Some(c) = self.source.next_char()? {
            if c == end {
                break;
            }
        }
        Ok(())
    }

    fn read_name(&mut self, first: char) -> Result<String, ProtocolError> {
        let mut name = String::from(first);
        while let Some(c) = self.source.next_char()? {
            if c <= ' ' || matches!(c, '>' | '/' | '=') {
                self.source.push_back(c);
                break;
            }
            name.push(c);
        }
        Ok(name)
    }

    fn read_end_tag(&mut self) -> Result<Token, ProtocolError> {
        let Some(first) = self.skip_whitespace()? else {
            return Ok(self.finish());
        };
        let name = if first == '>' {
            String::new()
        } else {
            let name = self.read_name(first)?;
            self.skip_past('>')?;
            name
        };
        Ok(Token::EndTag(name))
    }

    fn read_start_tag(&mut self, first: char) -> Result<Token, ProtocolError> {
        let mut tag = StartTag::new(self.read_name(first)?);

        loop {
            let Some(c) = self.skip_whitespace()? else {
                return Ok(self.finish());
            };
            match c {
                '>' => break,
                '/' => {
                    self.skip_past('>')?;
                    tag.self_closing = true;
                    self.pending_end = Some(tag.name.clone());
                    break;
                }
                _ => {
                    let key = self.read_name(c)?;
                    let Some(c) = self.skip_whitespace()? else {
                        return Ok(self.finish());
                    };
                    if c != '=' {
                        // Attribute without a value.
                        self.source.push_back(c);
                        tag.attributes.insert(key, String::new());
                        continue;
                    }
                    let Some(quote) = self.skip_whitespace()? else {
                        return Ok(self.finish());
                    };
                    let value = if quote == '\'' || quote == '"' {
                        self.read_quoted(quote)?
                    } else {
                        self.read_name(quote)?
                    };
                    tag.attributes.insert(key, value);
                }
            }
        }

        Ok(Token::StartTag(tag))
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, ProtocolError> {
        let mut value = String::new();
        while let Some(c) = self.source.next_char()? {
            match c {
                _ if c == quote => break,
                '&' => self.decode_entity(&mut value, quote)?,
                _ => value.push(c),
            }
        }
        Ok(value)
    }

    fn read_text(&mut self) -> Result<String, ProtocolError> {
        let mut text = String::new();
        while let Some(c) = self.source.next_char()? {
            match c {
                '<' => {
                    self.source.push_back(c);
                    break;
                }
                '&' => self.decode_entity(&mut text, '<')?,
                '\\' => match self.source.next_char()? {
                    Some('<') => {
                        self.source.push_back('<');
                        break;
                    }
                    Some(escaped) => text.push(escaped),
                    None => break,
                },
                _ => text.push(c),
            }
        }
        Ok(text)
    }

    /// Decodes the entity following a `&` into `out`. Stops early at
    /// `terminator` or `<`, leaving it unread.
    fn decode_entity(
        &mut self,
        out: &mut String,
        terminator: char,
    ) -> Result<(), ProtocolError> {
        let Some(first) = self.source.next_char()? else {
            return Ok(());
        };
        let decoded = match first {
            'l' => '<',
            'g' => '>',
            'q' => '"',
            'n' => ' ',
            'a' => match self.source.next_char()? {
                Some('m') => '&',
                Some(';') | None => {
                    out.push('\'');
                    return Ok(());
                }
                Some(_) => '\'',
            },
            ';' => {
                out.push('?');
                return Ok(());
            }
            c if c == terminator || c == '<' => {
                out.push('?');
                self.source.push_back(c);
                return Ok(());
            }
            _ => '?',
        };
        out.push(decoded);

        while let Some(c) = self.source.next_char()? {
            if c == ';' {
                break;
            }
            if c == terminator || c == '<' {
                self.source.push_back(c);
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut reader = XmlReader::new(input.as_bytes());
        let mut out = Vec::new();
        loop {
            let token = reader.next_token().expect("token");
            if token == Token::EndOfStream {
                return out;
            }
            out.push(token);
        }
    }

    fn start(name: &str, attrs: &[(&str, &str)]) -> Token {
        let mut tag = StartTag::new(name);
        for (k, v) in attrs {
            tag.attributes.insert((*k).into(), (*v).into());
        }
        Token::StartTag(tag)
    }

    fn self_closing(name: &str) -> Token {
        let mut tag = StartTag::new(name);
        tag.self_closing = true;
        Token::StartTag(tag)
    }

    #[test]
    fn test_next_token_message_with_body() {
        let got = tokens("<message from='a@b'><body>hi</body></message>");
        assert_eq!(
            got,
            vec![
                start("message", &[("from", "a@b")]),
                start("body", &[]),
                Token::Text("hi".into()),
                Token::EndTag("body".into()),
                Token::EndTag("message".into()),
            ]
        );
    }

    #[test]
    fn test_next_token_self_closing_emits_end_tag() {
        let got = tokens("<presence/>");
        assert_eq!(
            got,
            vec![self_closing("presence"), Token::EndTag("presence".into())]
        );
    }

    #[test]
    fn test_next_token_self_closing_with_attributes() {
        let got = tokens("<item jid='x@y' name=\"X\"/>");
        let Token::StartTag(tag) = &got[0] else {
            panic!("expected start tag, got {:?}", got[0]);
        };
        assert!(tag.self_closing);
        assert_eq!(tag.attr("jid"), Some("x@y"));
        assert_eq!(tag.attr("name"), Some("X"));
        assert_eq!(got[1], Token::EndTag("item".into()));
    }

    #[test]
    fn test_next_token_skips_prolog_and_comments() {
        let got = tokens("<?xml version='1.0'?><!-- note --><a>x</a>");
        assert_eq!(
            got,
            vec![
                start("a", &[]),
                Token::Text("x".into()),
                Token::EndTag("a".into()),
            ]
        );
    }

    #[test]
    fn test_next_token_whitespace_only_text_is_dropped() {
        let got = tokens("<a>\n   <b/>\n</a>");
        assert_eq!(
            got,
            vec![
                start("a", &[]),
                self_closing("b"),
                Token::EndTag("b".into()),
                Token::EndTag("a".into()),
            ]
        );
    }

    #[test]
    fn test_next_token_leading_whitespace_trimmed_trailing_kept() {
        let got = tokens("<a>  hello world  </a>");
        assert_eq!(got[1], Token::Text("hello world  ".into()));
    }

    #[test]
    fn test_next_token_decodes_entities() {
        let got = tokens("<a>&lt;&gt;&amp;&apos;&quot;&nbsp;&#60;</a>");
        assert_eq!(got[1], Token::Text("<>&'\" ?".into()));
    }

    #[test]
    fn test_next_token_decodes_entities_in_attributes() {
        let got = tokens("<a v='x&amp;y&apos;z'/>");
        let tag = got[0].as_start().expect("start tag");
        assert_eq!(tag.attr("v"), Some("x&y'z"));
    }

    #[test]
    fn test_next_token_unterminated_entity_stops_at_tag() {
        let got = tokens("<a>AT&T</a>");
        assert_eq!(
            got,
            vec![
                start("a", &[]),
                Token::Text("AT?".into()),
                Token::EndTag("a".into()),
            ]
        );
    }

    #[test]
    fn test_next_token_backslash_escapes_next_char() {
        let got = tokens("<a>x\\y</a>");
        assert_eq!(got[1], Token::Text("xy".into()));
    }

    #[test]
    fn test_next_token_backslash_before_tag_ends_text() {
        let got = tokens("<a>x\\</a>");
        assert_eq!(
            got,
            vec![
                start("a", &[]),
                Token::Text("x".into()),
                Token::EndTag("a".into()),
            ]
        );
    }

    #[test]
    fn test_next_token_stream_open_is_not_closed() {
        let got = tokens(
            "<?xml version='1.0'?><stream:stream xmlns='jabber:client' id='s1'>",
        );
        assert_eq!(got.len(), 1);
        let tag = got[0].as_start().expect("start tag");
        assert_eq!(tag.name, "stream:stream");
        assert_eq!(tag.attr("id"), Some("s1"));
    }

    #[test]
    fn test_next_token_end_of_stream_is_sticky() {
        let mut reader = XmlReader::new(&b"<a>"[..]);
        reader.next_token().expect("start");
        assert_eq!(reader.next_token().expect("eof"), Token::EndOfStream);
        assert_eq!(reader.next_token().expect("eof"), Token::EndOfStream);
    }

    #[test]
    fn test_next_token_eof_inside_tag_is_end_of_stream() {
        assert!(tokens("<message to='x").is_empty());
    }

    #[test]
    fn test_next_token_utf8_text() {
        let got = tokens("<body>héllo ✓</body>");
        assert_eq!(got[1], Token::Text("héllo ✓".into()));
    }

    #[test]
    fn test_skip_element_consumes_nested_children() {
        let mut reader =
            XmlReader::new(&b"<x><y><z/>t</y></x><next/>"[..]);
        reader.next_token().expect("start x");
        reader.skip_element("x").expect("skip");
        let next = reader.next_token().expect("next");
        assert_eq!(next.as_start().map(|t| t.name.as_str()), Some("next"));
    }

    #[test]
    fn test_skip_element_eof_is_error() {
        let mut reader = XmlReader::new(&b"<x><y>"[..]);
        reader.next_token().expect("start x");
        let err = reader.skip_element("x").expect_err("should fail");
        assert!(matches!(err, ProtocolError::UnexpectedEof(name) if name == "x"));
    }

    #[test]
    fn test_element_text_concatenates_nested_text() {
        let mut reader =
            XmlReader::new(&b"<status>away <b>now</b>!</status>"[..]);
        reader.next_token().expect("start");
        assert_eq!(reader.element_text("status").expect("text"), "away now!");
    }

    #[test]
    fn test_element_text_self_closing_is_empty() {
        let mut reader = XmlReader::new(&b"<group/>"[..]);
        reader.next_token().expect("start");
        assert_eq!(reader.element_text("group").expect("text"), "");
    }

    #[test]
    fn test_next_child_skips_text_and_stops_at_end() {
        let mut reader = XmlReader::new(&b"<q>junk<item/></q>"[..]);
        reader.next_token().expect("start");
        let child = reader.next_child("q").expect("child").expect("some");
        assert_eq!(child.name, "item");
        reader.skip_element("item").expect("skip");
        assert!(reader.next_child("q").expect("end").is_none());
    }

    #[test]
    fn test_take_capture_returns_raw_element() {
        let mut reader = XmlReader::new(&b"<a x='1'>&lt;</a><b/>"[..]);
        reader.set_capture(true);
        reader.next_token().expect("start");
        reader.skip_element("a").expect("skip");
        assert_eq!(
            reader.take_capture().as_deref(),
            Some("<a x='1'>&lt;</a>")
        );
    }
}
