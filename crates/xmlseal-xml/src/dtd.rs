#![forbid(unsafe_code)]

//! Attribute-list declarations from the internal DTD subset.
//!
//! roxmltree reads entity declarations but skips `<!ATTLIST>`.  Canonical
//! XML still depends on them: a declared default adds the attribute to
//! every element that omits it, and any type other than `CDATA` collapses
//! whitespace in the value.
//!
//! Declarations whose effect cannot be reproduced exactly are rejected
//! with [`Error::XmlStructure`]: defaulted namespace declarations,
//! parameter-entity references, and defaults that refer to general
//! entities other than the predefined ones.

use std::borrow::Cow;

use xmlseal_core::Error;

/// Default part of an attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefault<'i> {
    Required,
    Implied,
    /// `#FIXED "value"`, already normalized.
    Fixed(Cow<'i, str>),
    /// `"value"`, already normalized.
    Value(Cow<'i, str>),
}

/// One attribute definition from an `<!ATTLIST>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl<'i> {
    /// Element name as written in the declaration.
    pub element: &'i str,
    /// Attribute name as written in the declaration.
    pub name: &'i str,
    /// Declared with a type other than `CDATA`.
    pub tokenized: bool,
    pub default: AttributeDefault<'i>,
}

impl<'i> AttributeDecl<'i> {
    /// Value an element gets when it does not carry the attribute.
    pub fn default_value(&self) -> Option<&str> {
        match &self.default {
            AttributeDefault::Fixed(v) | AttributeDefault::Value(v) => Some(v),
            AttributeDefault::Required | AttributeDefault::Implied => None,
        }
    }

    /// Apply the type-dependent part of attribute-value normalization to a
    /// value the parser has already CDATA-normalized.
    pub fn normalize<'v>(&self, value: &'v str) -> Cow<'v, str> {
        if self.tokenized {
            collapse_spaces(value)
        } else {
            Cow::Borrowed(value)
        }
    }
}

/// Every attribute definition of a document, first definition winning.
#[derive(Debug, Clone, Default)]
pub struct AttributeDecls<'i> {
    decls: Vec<AttributeDecl<'i>>,
}

impl<'i> AttributeDecls<'i> {
    /// Read the declarations from the prolog of `doc`.
    pub fn from_document(doc: &roxmltree::Document<'i>) -> Result<Self, Error> {
        let input = doc.input_text();
        let prolog = &input[..doc.root_element().range().start];
        Self::from_prolog(prolog)
    }

    /// Read the declarations from the text before the document element.
    pub fn from_prolog(prolog: &'i str) -> Result<Self, Error> {
        let mut decls = Self::default();
        let Some(subset) = internal_subset(prolog)? else {
            return Ok(decls);
        };

        let mut rest = subset;
        loop {
            rest = rest.trim_start_matches(is_xml_space);
            if rest.is_empty() {
                return Ok(decls);
            } else if let Some(after) = rest.strip_prefix("<!--") {
                rest = skip_past(after, "-->")?;
            } else if let Some(after) = rest.strip_prefix("<?") {
                rest = skip_past(after, "?>")?;
            } else if let Some(after) = rest.strip_prefix("<!ATTLIST") {
                let (body, after) = split_declaration(after)?;
                decls.add_attlist(body)?;
                rest = after;
            } else if let Some(after) = rest.strip_prefix("<!") {
                rest = split_declaration(after)?.1;
            } else if rest.starts_with('%') {
                return Err(Error::XmlStructure(
                    "parameter entity references in the DTD are not supported".into(),
                ));
            } else {
                return Err(Error::XmlStructure("malformed DTD internal subset".into()));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Definitions for elements named `element` (as written in the source).
    pub fn for_element<'s>(&'s self, element: &'s str) -> impl Iterator<Item = &'s AttributeDecl<'i>> + 's {
        self.decls.iter().filter(move |d| d.element == element)
    }

    /// The definition of `attribute` on `element`, both as written.
    pub fn find(&self, element: &str, attribute: &str) -> Option<&AttributeDecl<'i>> {
        self.decls
            .iter()
            .find(|d| d.element == element && d.name == attribute)
    }

    fn add_attlist(&mut self, body: &'i str) -> Result<(), Error> {
        let malformed = || Error::XmlStructure(format!("malformed ATTLIST declaration: {}", body.trim()));
        let mut tokens = tokenize(body)?.into_iter();

        let element = match tokens.next() {
            Some(Token::Name(name)) => name,
            _ => return Err(malformed()),
        };
        while let Some(token) = tokens.next() {
            let Token::Name(name) = token else {
                return Err(malformed());
            };
            let tokenized = match tokens.next() {
                Some(Token::Name("CDATA")) => false,
                Some(Token::Name("NOTATION")) => match tokens.next() {
                    Some(Token::Group) => true,
                    _ => return Err(malformed()),
                },
                Some(Token::Name(_)) | Some(Token::Group) => true,
                _ => return Err(malformed()),
            };
            let default = match tokens.next() {
                Some(Token::Name("#REQUIRED")) => AttributeDefault::Required,
                Some(Token::Name("#IMPLIED")) => AttributeDefault::Implied,
                Some(Token::Name("#FIXED")) => match tokens.next() {
                    Some(Token::Literal(v)) => AttributeDefault::Fixed(default_literal(v, tokenized)?),
                    _ => return Err(malformed()),
                },
                Some(Token::Literal(v)) => AttributeDefault::Value(default_literal(v, tokenized)?),
                _ => return Err(malformed()),
            };

            let decl = AttributeDecl {
                element,
                name,
                tokenized,
                default,
            };
            if decl.default_value().is_some() && (name == "xmlns" || name.starts_with("xmlns:")) {
                return Err(Error::XmlStructure(format!(
                    "namespace declaration {name} defaulted by the DTD is not supported"
                )));
            }
            if self.find(element, name).is_none() {
                self.decls.push(decl);
            }
        }
        Ok(())
    }
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// The text between `[` and `]` of the document type declaration, if any.
fn internal_subset(prolog: &str) -> Result<Option<&str>, Error> {
    let mut rest = prolog.trim_start_matches('\u{feff}');
    loop {
        rest = rest.trim_start_matches(is_xml_space);
        if let Some(after) = rest.strip_prefix("<?") {
            rest = skip_past(after, "?>")?;
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = skip_past(after, "-->")?;
        } else if let Some(after) = rest.strip_prefix("<!DOCTYPE") {
            rest = after;
            break;
        } else {
            return Ok(None);
        }
    }

    // name and external id, up to '[' or '>'
    let mut quote = None;
    let mut open = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => {
                open = Some(i + 1);
                break;
            }
            (None, '>') => return Ok(None),
            (None, _) => {}
        }
    }
    let Some(start) = open else {
        return Err(Error::XmlStructure("unterminated document type declaration".into()));
    };

    let subset = &rest[start..];
    let mut scan = subset;
    loop {
        scan = scan.trim_start_matches(is_xml_space);
        if scan.starts_with(']') {
            return Ok(Some(&subset[..subset.len() - scan.len()]));
        } else if let Some(after) = scan.strip_prefix("<!--") {
            scan = skip_past(after, "-->")?;
        } else if let Some(after) = scan.strip_prefix("<?") {
            scan = skip_past(after, "?>")?;
        } else if let Some(after) = scan.strip_prefix("<!") {
            scan = split_declaration(after)?.1;
        } else if let Some(after) = scan.strip_prefix('%') {
            scan = skip_past(after, ";")?;
        } else {
            return Err(Error::XmlStructure("malformed DTD internal subset".into()));
        }
    }
}

fn skip_past<'a>(text: &'a str, end: &str) -> Result<&'a str, Error> {
    text.find(end)
        .map(|i| &text[i + end.len()..])
        .ok_or_else(|| Error::XmlStructure(format!("unterminated DTD construct, expected {end:?}")))
}

/// Split a markup declaration at its closing `>`, ignoring any inside
/// quoted literals.
fn split_declaration(text: &str) -> Result<(&str, &str), Error> {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Ok((&text[..i], &text[i + 1..])),
            (None, _) => {}
        }
    }
    Err(Error::XmlStructure("unterminated DTD declaration".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'i> {
    Name(&'i str),
    Literal(&'i str),
    /// A parenthesized enumeration; its members do not matter here.
    Group,
}

fn tokenize(body: &str) -> Result<Vec<Token<'_>>, Error> {
    let mut tokens = Vec::new();
    let mut rest = body;
    loop {
        rest = rest.trim_start_matches(is_xml_space);
        let Some(first) = rest.chars().next() else {
            return Ok(tokens);
        };
        match first {
            '"' | '\'' => {
                let end = rest[1..]
                    .find(first)
                    .ok_or_else(|| Error::XmlStructure("unterminated literal in ATTLIST".into()))?;
                tokens.push(Token::Literal(&rest[1..1 + end]));
                rest = &rest[end + 2..];
            }
            '(' => {
                rest = skip_past(&rest[1..], ")")?;
                tokens.push(Token::Group);
            }
            '%' => {
                return Err(Error::XmlStructure(
                    "parameter entity references in the DTD are not supported".into(),
                ));
            }
            _ => {
                let end = rest
                    .find(|c: char| is_xml_space(c) || matches!(c, '"' | '\'' | '('))
                    .unwrap_or(rest.len());
                tokens.push(Token::Name(&rest[..end]));
                rest = &rest[end..];
            }
        }
    }
}

/// Normalize a default value literal the way a parser normalizes an
/// attribute value written in a start tag.
fn default_literal(raw: &str, tokenized: bool) -> Result<Cow<'_, str>, Error> {
    if !raw.contains(['&', '\t', '\n', '\r']) {
        return Ok(if tokenized { collapse_spaces(raw) } else { Cow::Borrowed(raw) });
    }

    let mut value = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if c == '&' {
            let end = rest
                .find(';')
                .ok_or_else(|| Error::XmlStructure(format!("unterminated reference in DTD default {raw:?}")))?;
            value.push(resolve_reference(&rest[1..end], raw)?);
            rest = &rest[end + 1..];
        } else if rest.starts_with("\r\n") {
            value.push(' ');
            rest = &rest[2..];
        } else {
            value.push(if is_xml_space(c) { ' ' } else { c });
            rest = &rest[c.len_utf8()..];
        }
    }

    if tokenized {
        return Ok(Cow::Owned(collapse_spaces(&value).into_owned()));
    }
    Ok(Cow::Owned(value))
}

fn resolve_reference(name: &str, raw: &str) -> Result<char, Error> {
    let code = if let Some(hex) = name.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()
    } else {
        return match name {
            "lt" => Ok('<'),
            "gt" => Ok('>'),
            "amp" => Ok('&'),
            "apos" => Ok('\''),
            "quot" => Ok('"'),
            _ => Err(Error::XmlStructure(format!(
                "entity reference &{name}; in DTD default {raw:?} is not supported"
            ))),
        };
    };
    code.and_then(char::from_u32)
        .ok_or_else(|| Error::XmlStructure(format!("invalid character reference in DTD default {raw:?}")))
}

/// Drop leading and trailing spaces and fold runs of spaces into one.
fn collapse_spaces(value: &str) -> Cow<'_, str> {
    let trimmed = value.trim_matches(' ');
    if !trimmed.contains("  ") {
        return Cow::Borrowed(trimmed);
    }
    let mut out = String::with_capacity(trimmed.len());
    for (i, part) in trimmed.split(' ').filter(|p| !p.is_empty()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(part);
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_doctype() {
        let decls = AttributeDecls::from_prolog("<?xml version=\"1.0\"?><!-- c -->").unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn test_external_only_doctype() {
        let decls = AttributeDecls::from_prolog(r#"<!DOCTYPE a SYSTEM "a[1].dtd">"#).unwrap();
        assert!(decls.is_empty());
    }

    #[test]
    fn test_attlist_forms() {
        let prolog = r#"<!DOCTYPE Invoice [
            <!-- <!ATTLIST Invoice ignored CDATA "no"> -->
            <!ENTITY co "ACME > Co">
            <!ATTLIST Invoice
                currency CDATA "BRL"
                id ID #IMPLIED
                kind (a|b) 'a'
                ver NMTOKEN #FIXED "  1.0 "
                note CDATA #REQUIRED>
            <!ATTLIST Invoice currency CDATA "USD">
        ]>"#;
        let decls = AttributeDecls::from_prolog(prolog).unwrap();
        let names: Vec<_> = decls.for_element("Invoice").map(|d| d.name).collect();
        assert_eq!(names, ["currency", "id", "kind", "ver", "note"]);

        let currency = decls.find("Invoice", "currency").unwrap();
        assert_eq!(currency.default_value(), Some("BRL"));
        assert!(!currency.tokenized);
        assert!(decls.find("Invoice", "id").unwrap().tokenized);
        assert_eq!(decls.find("Invoice", "id").unwrap().default_value(), None);
        assert_eq!(decls.find("Invoice", "kind").unwrap().default_value(), Some("a"));
        assert_eq!(decls.find("Invoice", "ver").unwrap().default_value(), Some("1.0"));
        assert!(decls.find("Invoice", "ignored").is_none());
    }

    #[test]
    fn test_tokenized_normalization() {
        let decls = AttributeDecls::from_prolog("<!DOCTYPE a [<!ATTLIST a id ID #IMPLIED t CDATA #IMPLIED>]>").unwrap();
        assert_eq!(decls.find("a", "id").unwrap().normalize("  x   y "), "x y");
        assert_eq!(decls.find("a", "t").unwrap().normalize("  x   y "), "  x   y ");
    }

    #[test]
    fn test_default_references_and_whitespace() {
        let decls = AttributeDecls::from_prolog(
            "<!DOCTYPE a [<!ATTLIST a v CDATA \"x&amp;y&#x41;\tz\" w NMTOKENS \" p\r\n q \">]>",
        )
        .unwrap();
        assert_eq!(decls.find("a", "v").unwrap().default_value(), Some("x&yA z"));
        assert_eq!(decls.find("a", "w").unwrap().default_value(), Some("p q"));
    }

    #[test]
    fn test_unsupported_declarations_rejected() {
        for prolog in [
            r#"<!DOCTYPE a [<!ATTLIST a xmlns CDATA "urn:x">]>"#,
            r#"<!DOCTYPE a [<!ATTLIST a xmlns:p CDATA #FIXED "urn:p">]>"#,
            r#"<!DOCTYPE a [<!ENTITY % p "x"> %p;]>"#,
            r#"<!DOCTYPE a [<!ENTITY e "x"><!ATTLIST a v CDATA "&e;">]>"#,
            r#"<!DOCTYPE a [<!ATTLIST a v CDATA>]>"#,
            r#"<!DOCTYPE a [<!ATTLIST a v CDATA "x"#,
        ] {
            let err = AttributeDecls::from_prolog(prolog).unwrap_err();
            assert!(matches!(err, Error::XmlStructure(_)), "{prolog}: {err:?}");
        }
    }

    #[test]
    fn test_namespace_declaration_without_default_is_fine() {
        let decls = AttributeDecls::from_prolog(r#"<!DOCTYPE a [<!ATTLIST a xmlns CDATA #IMPLIED>]>"#).unwrap();
        assert_eq!(decls.find("a", "xmlns").unwrap().default_value(), None);
    }
}
