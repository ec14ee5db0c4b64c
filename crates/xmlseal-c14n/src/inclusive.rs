#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0.
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - renders every element with an explicit start and end tag
//! - emits a namespace declaration only where it differs from the nearest
//!   rendered ancestor, sorted by prefix with the default namespace first
//! - sorts attributes by (namespace URI, local name), unqualified first
//! - escapes text and attribute values
//! - optionally keeps comments
//!
//! For a document subset, nodes outside the [`NodeSet`] are skipped, and an
//! element whose parent is not rendered picks up the `xml:*` attributes it
//! would otherwise have inherited.
//!
//! Attribute-list declarations in the internal DTD subset are honoured:
//! declared defaults are added and tokenized values are normalized.

use crate::escape;
use crate::render::{Attr, NsDecl};
use roxmltree::{Node, NodeType};
use std::borrow::Cow;
use std::collections::BTreeMap;
use xmlseal_core::{ns, Error};
use xmlseal_xml::{AttributeDecls, NodeSet};

/// prefix ("" for the default namespace) to namespace URI
type NsMap<'a> = BTreeMap<&'a str, &'a str>;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::with_capacity(doc.input_text().len());
    let ctx = C14nContext {
        with_comments,
        node_set,
        decls: AttributeDecls::from_document(doc)?,
    };
    ctx.process_node(doc.root(), &mut output, &NsMap::new())?;
    Ok(output)
}

struct C14nContext<'s, 'input> {
    with_comments: bool,
    node_set: Option<&'s NodeSet>,
    decls: AttributeDecls<'input>,
}

impl<'input> C14nContext<'_, 'input> {
    fn is_visible(&self, node: &Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn process_node<'a>(
        &self,
        node: Node<'a, 'input>,
        output: &mut Vec<u8>,
        rendered_ns: &NsMap<'a>,
    ) -> Result<(), Error> {
        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            NodeType::Element => self.process_element(node, output, rendered_ns)?,
            NodeType::Text => {
                if self.is_visible(&node) {
                    escape::escape_text_into(node.text().unwrap_or(""), output);
                }
            }
            NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    with_document_level_breaks(&node, output, |out| {
                        out.extend_from_slice(b"<!--");
                        out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                        out.extend_from_slice(b"-->");
                    });
                }
            }
            NodeType::PI => {
                if let (true, Some(pi)) = (self.is_visible(&node), node.pi()) {
                    with_document_level_breaks(&node, output, |out| {
                        out.extend_from_slice(b"<?");
                        out.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                            out.push(b' ');
                            escape::escape_pi_into(value, out);
                        }
                        out.extend_from_slice(b"?>");
                    });
                }
            }
        }
        Ok(())
    }

    fn process_element<'a>(
        &self,
        node: Node<'a, 'input>,
        output: &mut Vec<u8>,
        rendered_ns: &NsMap<'a>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            // Children of a skipped element see the same rendered context.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let in_scope = inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl<'a>> = in_scope
            .iter()
            .map(|(&prefix, &uri)| NsDecl { prefix, uri })
            .filter(|decl| rendered_ns.get(decl.prefix) != Some(&decl.uri))
            .collect();
        let inherited_default = rendered_ns.get("").copied().unwrap_or("");
        if !inherited_default.is_empty() && !in_scope.contains_key("") {
            ns_decls.push(NsDecl { prefix: "", uri: "" });
        }
        ns_decls.sort();

        let mut attrs = self.attributes(&node)?;
        if self.node_set.is_some() {
            let parent_rendered = node
                .parent()
                .is_some_and(|p| p.is_element() && self.is_visible(&p));
            if !parent_rendered {
                let inherited = self.inherited_xml_attrs(&node, &attrs)?;
                attrs.extend(inherited);
            }
        }
        attrs.sort();

        let name = element_qname(&node);
        output.push(b'<');
        output.extend_from_slice(name.as_bytes());
        for decl in &ns_decls {
            decl.write_to(output);
        }
        for attr in &attrs {
            attr.write_to(output);
        }
        output.push(b'>');

        for child in node.children() {
            self.process_node(child, output, &in_scope)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(name.as_bytes());
        output.push(b'>');
        Ok(())
    }

    /// The attributes of `node` as the DTD makes them: specified values
    /// normalized by their declared type, plus declared defaults the element
    /// does not carry.
    fn attributes<'a>(&self, node: &Node<'a, 'input>) -> Result<Vec<Attr<'a>>, Error> {
        let input = node.document().input_text();
        let element = element_qname(node);
        let mut attrs: Vec<Attr<'a>> = node
            .attributes()
            .map(|attr| {
                let qualified_name = &input[attr.range_qname()];
                let value = match self.decls.find(element, qualified_name) {
                    Some(decl) => decl.normalize(attr.value()),
                    None => Cow::Borrowed(attr.value()),
                };
                Attr {
                    ns_uri: attr.namespace().unwrap_or(""),
                    local_name: attr.name(),
                    qualified_name: Cow::Borrowed(qualified_name),
                    value,
                }
            })
            .collect();
        if self.decls.is_empty() {
            return Ok(attrs);
        }

        for decl in self.decls.for_element(element) {
            let Some(value) = decl.default_value() else {
                continue;
            };
            if attrs.iter().any(|a| a.qualified_name == decl.name) {
                continue;
            }
            let (ns_uri, local_name) = match decl.name.split_once(':') {
                Some(("xml", local)) => (ns::XML, local),
                Some((prefix, local)) => {
                    let uri = node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                        Error::XmlStructure(format!(
                            "DTD default attribute {} uses undeclared prefix {prefix}",
                            decl.name
                        ))
                    })?;
                    (uri, local)
                }
                None => ("", decl.name),
            };
            attrs.push(Attr {
                ns_uri,
                local_name,
                qualified_name: Cow::Borrowed(decl.name),
                value: Cow::Owned(value.to_owned()),
            });
        }
        Ok(attrs)
    }

    /// `xml:*` attributes from the ancestor axis that `node` does not carry
    /// itself.  The nearest ancestor's value wins.
    fn inherited_xml_attrs<'a>(&self, node: &Node<'a, 'input>, own: &[Attr<'a>]) -> Result<Vec<Attr<'a>>, Error> {
        let mut inherited: BTreeMap<&'a str, Attr<'a>> = BTreeMap::new();
        for ancestor in node.ancestors().skip(1).filter(|n| n.is_element()) {
            for attr in self.attributes(&ancestor)? {
                if attr.ns_uri == ns::XML {
                    inherited.entry(attr.local_name).or_insert(attr);
                }
            }
        }

        Ok(inherited
            .into_values()
            .filter(|attr| !own.iter().any(|a| a.ns_uri == ns::XML && a.local_name == attr.local_name))
            .collect())
    }
}

/// Namespaces in scope at `node`, without the implicit `xml` binding and
/// without an undeclared (`xmlns=""`) default namespace.
fn inscope_namespaces<'a, 'input: 'a>(node: &Node<'a, 'input>) -> NsMap<'a> {
    node.namespaces()
        .filter(|n| n.name().is_some() || !n.uri().is_empty())
        .map(|n| (n.name().unwrap_or(""), n.uri()))
        .collect()
}

/// The element name exactly as written in the source (`prefix:local` or `local`).
fn element_qname<'input>(node: &Node<'_, 'input>) -> &'input str {
    let input = node.document().input_text();
    let rest = &input[node.range().start + 1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Comments and PIs outside the document element are separated from it by
/// a line feed.
fn with_document_level_breaks(node: &Node<'_, '_>, output: &mut Vec<u8>, write: impl FnOnce(&mut Vec<u8>)) {
    let top_level = node.parent().is_some_and(|p| p.is_root());
    if top_level && node.prev_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
    write(output);
    if top_level && node.next_siblings().any(|s| s.is_element()) {
        output.push(b'\n');
    }
}
