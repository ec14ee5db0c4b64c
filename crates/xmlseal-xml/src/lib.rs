#![forbid(unsafe_code)]

//! XML document abstraction for xmlseal.
//!
//! Provides an owned document over `roxmltree`, the `NodeSet` type used by
//! canonicalization and the enveloped-signature transform, and a small
//! writer used to render signature templates.

pub mod document;
pub mod dtd;
pub mod nodeset;
pub mod writer;

pub use document::{find_child_element, find_child_elements, is_element_named, RootStartTag, XmlDocument};
pub use dtd::{AttributeDecl, AttributeDecls};
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond internal entity declarations, so it
/// is safe for untrusted input.  Attribute-list declarations are read
/// separately, see [`dtd`].
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse text into a temporary `roxmltree::Document`, mapping errors into
/// the library taxonomy.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, xmlseal_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options()).map_err(|e| match e {
        roxmltree::Error::NoRootNode => xmlseal_core::Error::NoRootElement,
        other => xmlseal_core::Error::XmlParse(other.to_string()),
    })
}
