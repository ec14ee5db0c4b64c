#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! Text nodes escape `&`, `<`, `>` and carriage return.  Attribute values
//! escape `&`, `<`, `"`, tab, line feed and carriage return.  Processing
//! instruction data only escapes carriage return.

/// Append text node content to `out`, escaped.
pub fn escape_text_into(s: &str, out: &mut Vec<u8>) {
    escape_into(s, out, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        _ => None,
    });
}

/// Append an attribute value to `out`, escaped.
pub fn escape_attr_into(s: &str, out: &mut Vec<u8>) {
    escape_into(s, out, |ch| match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '"' => Some("&quot;"),
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        _ => None,
    });
}

/// Append processing instruction data to `out`, escaped.
pub fn escape_pi_into(s: &str, out: &mut Vec<u8>) {
    escape_into(s, out, |ch| (ch == '\r').then_some("&#xD;"));
}

fn escape_into(s: &str, out: &mut Vec<u8>, entity: impl Fn(char) -> Option<&'static str>) {
    let mut buf = [0u8; 4];
    for ch in s.chars() {
        match entity(ch) {
            Some(e) => out.extend_from_slice(e.as_bytes()),
            None => out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> String {
        let mut out = Vec::new();
        escape_text_into(s, &mut out);
        String::from_utf8(out).unwrap()
    }

    fn attr(s: &str) -> String {
        let mut out = Vec::new();
        escape_attr_into(s, &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(text("héllo"), "héllo");
        assert_eq!(text("a&b<c>d\"e"), "a&amp;b&lt;c&gt;d\"e");
        assert_eq!(text("line\rend"), "line&#xD;end");
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(attr("a>b"), "a>b");
        assert_eq!(attr("a&b\"c"), "a&amp;b&quot;c");
        assert_eq!(attr("a\tb\nc\rd"), "a&#x9;b&#xA;c&#xD;d");
    }

    #[test]
    fn test_escape_pi() {
        let mut out = Vec::new();
        escape_pi_into("x<\r", &mut out);
        assert_eq!(out, b"x<&#xD;");
    }
}
