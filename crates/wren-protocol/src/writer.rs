//! Incremental XML writer.
//!
//! [`XmlWriter`] emits markup as the caller describes it, tracking open
//! tags on a stack so [`end_tag`](XmlWriter::end_tag) knows what to
//! close. A start tag stays "open for attributes" until text, a child or
//! a flush forces its `>` out; closing it at that point produces `/>`.
//!
//! Nothing reaches the peer until [`flush`](XmlWriter::flush) is called.

use std::io::{self, Write};

/// Writes XML markup to a byte sink.
pub struct XmlWriter<W> {
    out: W,
    open: Vec<String>,
    inside_tag: bool,
    capture: Option<String>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open: Vec::new(),
            inside_tag: false,
            capture: None,
        }
    }

    /// Opens `<name`. Attributes may follow until anything else is written.
    pub fn start_tag(&mut self, name: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(name.len() + 2);
        if self.inside_tag {
            buf.push('>');
        }
        buf.push('<');
        buf.push_str(name);
        self.emit(&buf)?;
        self.open.push(name.to_owned());
        self.inside_tag = true;
        Ok(())
    }

    /// Adds ` name='value'` to the open start tag. A `None` value writes
    /// nothing.
    pub fn attribute<'v>(
        &mut self,
        name: &str,
        value: impl Into<Option<&'v str>>,
    ) -> io::Result<()> {
        let Some(value) = value.into() else {
            return Ok(());
        };
        if !self.inside_tag {
            tracing::warn!(attribute = name, "attribute outside a start tag dropped");
            return Ok(());
        }
        let mut buf = String::with_capacity(name.len() + value.len() + 4);
        buf.push(' ');
        buf.push_str(name);
        buf.push_str("='");
        escape_into(&mut buf, value);
        buf.push('\'');
        self.emit(&buf)
    }

    /// Writes escaped character data inside the current element.
    pub fn text(&mut self, value: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(value.len() + 1);
        if self.inside_tag {
            buf.push('>');
            self.inside_tag = false;
        }
        escape_into(&mut buf, value);
        self.emit(&buf)
    }

    /// Closes the innermost open element. Does nothing if none is open.
    pub fn end_tag(&mut self) -> io::Result<()> {
        let Some(name) = self.open.pop() else {
            return Ok(());
        };
        if self.inside_tag {
            self.inside_tag = false;
            self.emit("/>")
        } else {
            self.emit(&format!("</{name}>"))
        }
    }

    /// Writes `<name>text</name>`.
    pub fn text_element(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.start_tag(name)?;
        self.text(value)?;
        self.end_tag()
    }

    /// Finishes a pending start tag and pushes buffered bytes to the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.inside_tag {
            self.inside_tag = false;
            self.emit(">")?;
        }
        self.out.flush()
    }

    /// Number of elements currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Starts or stops recording emitted markup.
    pub fn set_capture(&mut self, enabled: bool) {
        self.capture = enabled.then(String::new);
    }

    /// Returns markup emitted since the previous call, if capturing.
    pub fn take_capture(&mut self) -> Option<String> {
        self.capture.as_mut().map(std::mem::take)
    }

    fn emit(&mut self, s: &str) -> io::Result<()> {
        if let Some(capture) = self.capture.as_mut() {
            capture.push_str(s);
        }
        self.out.write_all(s.as_bytes())
    }
}

/// Appends `value` to `buf` with the five XML special characters escaped.
pub fn escape_into(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '&' => buf.push_str("&amp;"),
            '\'' => buf.push_str("&apos;"),
            '"' => buf.push_str("&quot;"),
            _ => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut XmlWriter<&mut Vec<u8>>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        let mut writer = XmlWriter::new(&mut out);
        f(&mut writer).expect("write");
        writer.flush().expect("flush");
        drop(writer);
        String::from_utf8(out).expect("utf-8")
    }

    #[test]
    fn test_writer_empty_element_self_closes() {
        let xml = written(|w| {
            w.start_tag("presence")?;
            w.end_tag()
        });
        assert_eq!(xml, "<presence/>");
    }

    #[test]
    fn test_writer_nested_elements() {
        let xml = written(|w| {
            w.start_tag("message")?;
            w.attribute("to", "a@b")?;
            w.attribute("type", "chat")?;
            w.text_element("body", "hi")?;
            w.end_tag()
        });
        assert_eq!(xml, "<message to='a@b' type='chat'><body>hi</body></message>");
    }

    #[test]
    fn test_writer_none_attribute_is_omitted() {
        let xml = written(|w| {
            w.start_tag("presence")?;
            w.attribute("type", None::<&str>)?;
            w.end_tag()
        });
        assert_eq!(xml, "<presence/>");
    }

    #[test]
    fn test_writer_escapes_text_and_attributes() {
        let xml = written(|w| {
            w.start_tag("a")?;
            w.attribute("v", "it's \"x\"")?;
            w.text("1 < 2 & 3 > 0")?;
            w.end_tag()
        });
        assert_eq!(
            xml,
            "<a v='it&apos;s &quot;x&quot;'>1 &lt; 2 &amp; 3 &gt; 0</a>"
        );
    }

    #[test]
    fn test_writer_end_tag_on_empty_stack_is_noop() {
        let xml = written(|w| {
            w.end_tag()?;
            w.end_tag()
        });
        assert_eq!(xml, "");
    }

    #[test]
    fn test_writer_flush_closes_pending_start_tag() {
        let mut out = Vec::new();
        let mut writer = XmlWriter::new(&mut out);
        writer.start_tag("stream:stream").expect("start");
        writer.attribute("to", "example.org").expect("attr");
        writer.flush().expect("flush");
        assert_eq!(writer.depth(), 1);
        drop(writer);
        assert_eq!(out, b"<stream:stream to='example.org'>");
    }

    #[test]
    fn test_writer_end_tag_after_flush_writes_close_tag() {
        let xml = written(|w| {
            w.start_tag("stream:stream")?;
            w.flush()?;
            w.end_tag()
        });
        assert_eq!(xml, "<stream:stream></stream:stream>");
    }

    #[test]
    fn test_writer_attribute_after_text_is_dropped() {
        let xml = written(|w| {
            w.start_tag("a")?;
            w.text("x")?;
            w.attribute("late", "1")?;
            w.end_tag()
        });
        assert_eq!(xml, "<a>x</a>");
    }

    #[test]
    fn test_take_capture_returns_emitted_markup() {
        let mut writer = XmlWriter::new(Vec::new());
        writer.set_capture(true);
        writer.start_tag("iq").expect("start");
        writer.end_tag().expect("end");
        assert_eq!(writer.take_capture().as_deref(), Some("<iq/>"));
        assert_eq!(writer.take_capture().as_deref(), Some(""));
    }
}
