#![forbid(unsafe_code)]

//! Namespace declarations and attributes as they appear in canonical
//! output, with the ordering canonical XML requires.

use crate::escape;
use std::borrow::Cow;
use std::cmp::Ordering;

/// A namespace declaration to be rendered.  An empty prefix is the
/// default namespace; an empty URI on it is `xmlns=""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl<'a> {
    pub prefix: &'a str,
    pub uri: &'a str,
}

impl NsDecl<'_> {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        escape::escape_attr_into(self.uri, out);
        out.push(b'"');
    }
}

impl Ord for NsDecl<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // default namespace first, then by prefix
        let by_prefix = match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(other.prefix),
        };
        by_prefix.then_with(|| self.uri.cmp(other.uri))
    }
}

impl PartialOrd for NsDecl<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr<'a> {
    /// Namespace URI, empty for unqualified attributes.
    pub ns_uri: &'a str,
    pub local_name: &'a str,
    /// Name as written: `prefix:local` or `local`.
    pub qualified_name: Cow<'a, str>,
    pub value: Cow<'a, str>,
}

impl Attr<'_> {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::escape_attr_into(&self.value, out);
        out.push(b'"');
    }
}

impl Ord for Attr<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // unqualified attributes first, then by (namespace URI, local name)
        let by_name = match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self
                .ns_uri
                .cmp(other.ns_uri)
                .then_with(|| self.local_name.cmp(other.local_name)),
        };
        by_name
            .then_with(|| self.qualified_name.cmp(&other.qualified_name))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Attr<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr<'a>(ns_uri: &'a str, local_name: &'a str, qname: &str) -> Attr<'a> {
        Attr {
            ns_uri,
            local_name,
            qualified_name: Cow::Owned(qname.to_owned()),
            value: Cow::Borrowed(""),
        }
    }

    #[test]
    fn test_attr_order_unqualified_first() {
        let mut attrs = vec![
            attr("urn:b", "a", "b:a"),
            attr("", "z", "z"),
            attr("urn:a", "z", "a:z"),
            attr("", "b", "b"),
        ];
        attrs.sort();
        let names: Vec<_> = attrs.iter().map(|a| a.qualified_name.as_ref()).collect();
        assert_eq!(names, ["b", "z", "a:z", "b:a"]);
    }

    #[test]
    fn test_ns_order_default_first() {
        let mut decls = vec![
            NsDecl { prefix: "b", uri: "urn:b" },
            NsDecl { prefix: "", uri: "urn:d" },
            NsDecl { prefix: "a", uri: "urn:a" },
        ];
        decls.sort();
        let mut out = Vec::new();
        for d in &decls {
            d.write_to(&mut out);
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#" xmlns="urn:d" xmlns:a="urn:a" xmlns:b="urn:b""#
        );
    }

    #[test]
    fn test_ordering_agrees_with_equality() {
        let a = NsDecl { prefix: "p", uri: "urn:1" };
        let b = NsDecl { prefix: "p", uri: "urn:2" };
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);

        let mut x = attr("", "v", "v");
        let y = attr("", "v", "v");
        assert_eq!(x.cmp(&y), Ordering::Equal);
        x.value = Cow::Borrowed("1");
        assert_ne!(x, y);
        assert_ne!(x.cmp(&y), Ordering::Equal);
    }
}
