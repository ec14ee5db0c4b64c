#![forbid(unsafe_code)]

//! Owned XML document wrapper over roxmltree.

use xmlseal_core::Error;

use crate::dtd::AttributeDecls;

/// An owned XML document.  Stores the text that was validated on parse.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
}

/// Location of the document element's start tag inside the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootStartTag {
    /// Qualified name as written in the source (`prefix:local` or `local`).
    pub qname: String,
    /// Byte offset of the opening `<`.
    pub start: usize,
    /// Byte offset just past the closing `>`.
    pub end: usize,
    /// Whether the tag is written as `<root/>`.
    pub self_closing: bool,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("XML document is empty".into()));
        }
        {
            let doc = crate::parse(&text)?;
            AttributeDecls::from_document(&doc)?;
        }
        Ok(Self { text })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text.trim_start_matches('\u{feff}').to_owned())
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the document and return its text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    ///
    /// This re-parses the XML from the stored text.  Call it once at the top
    /// of a processing step and pass the resulting reference down.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Locate the start tag of the document element.
    pub fn root_start_tag(&self) -> Result<RootStartTag, Error> {
        let doc = self.parse_doc()?;
        let root = doc.root_element();
        let start = root.range().start;
        let bytes = self.text.as_bytes();
        if bytes.get(start) != Some(&b'<') {
            return Err(Error::XmlStructure(
                "document element does not start with '<'".into(),
            ));
        }

        let qname: String = self.text[start + 1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
            .collect();

        let mut quote: Option<u8> = None;
        for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
            match (quote, b) {
                (Some(q), _) if b == q => quote = None,
                (Some(_), _) => {}
                (None, b'"') | (None, b'\'') => quote = Some(b),
                (None, b'>') => {
                    return Ok(RootStartTag {
                        qname,
                        start,
                        end: i + 1,
                        self_closing: bytes[i - 1] == b'/',
                    });
                }
                (None, _) => {}
            }
        }
        Err(Error::XmlStructure("unterminated document element start tag".into()))
    }

    /// Return a new document with `fragment` inserted as the first child of
    /// the document element.  A self-closing root is expanded into an
    /// explicit start/end tag pair.  Everything outside the insertion point
    /// is kept byte-for-byte.
    pub fn with_first_child(&self, fragment: &str) -> Result<XmlDocument, Error> {
        let tag = self.root_start_tag()?;
        let mut out = String::with_capacity(self.text.len() + fragment.len() + tag.qname.len() + 3);
        if tag.self_closing {
            // drop the "/>" and reopen as "<root ...>fragment</root>"
            out.push_str(&self.text[..tag.end - 2]);
            out.push('>');
            out.push_str(fragment);
            out.push_str("</");
            out.push_str(&tag.qname);
            out.push('>');
        } else {
            out.push_str(&self.text[..tag.end]);
            out.push_str(fragment);
        }
        out.push_str(&self.text[tag.end..]);
        XmlDocument::parse(out)
    }

    /// Return a new document with the bytes in `range` replaced by
    /// `fragment`.  The range normally comes from `Node::range()` on a
    /// document parsed from this text.
    pub fn with_replaced(&self, range: std::ops::Range<usize>, fragment: &str) -> Result<XmlDocument, Error> {
        if range.start > range.end
            || range.end > self.text.len()
            || !self.text.is_char_boundary(range.start)
            || !self.text.is_char_boundary(range.end)
        {
            return Err(Error::XmlStructure(format!(
                "replacement range {range:?} is outside the document"
            )));
        }
        let mut out = String::with_capacity(self.text.len() - range.len() + fragment.len());
        out.push_str(&self.text[..range.start]);
        out.push_str(fragment);
        out.push_str(&self.text[range.end..]);
        XmlDocument::parse(out)
    }

    /// Find the first descendant element with the given local name and namespace.
    pub fn find_element<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        ns: &str,
        local_name: &str,
    ) -> Option<roxmltree::Node<'a, 'input>> {
        doc.descendants().find(|n| is_element_named(n, ns, local_name))
    }
}

/// Check whether a node is an element with the given namespace and local name.
pub fn is_element_named(node: &roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

/// Find the first child element with the given local name and namespace.
pub fn find_child_element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent.children().find(|n| is_element_named(n, ns, local_name))
}

/// Find all child elements with the given local name and namespace.
pub fn find_child_elements<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| is_element_named(n, ns, local_name))
        .collect()
}
