#![forbid(unsafe_code)]

//! Minimal XML writer used for template building.
//!
//! Elements are always written with explicit start and end tags, so the
//! output already matches its canonical form for the constructs it emits.

/// A simple streaming XML writer that appends to an owned `String`.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an element with the given qualified name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (attr_name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(attr_name);
            self.out.push_str("=\"");
            escape_attr_into(value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');
    }

    /// End the element with the given qualified name.
    pub fn end_element(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// Write an element with no attributes whose only child is `text`
    /// (which may be empty).
    pub fn text_element(&mut self, name: &str, text: &str) {
        self.start_element(name, &[]);
        self.write_text(text);
        self.end_element(name);
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                '\r' => self.out.push_str("&#xD;"),
                _ => self.out.push(ch),
            }
        }
    }

    /// Finish writing and return the XML text.
    pub fn into_string(self) -> String {
        self.out
    }
}

fn escape_attr_into(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}
