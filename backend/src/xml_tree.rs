//! In-memory XML element tree.
//!
//! Documents are parsed with quick-xml into an owned tree that the
//! extraction layer can walk repeatedly. quick-xml performs no DTD
//! loading and no entity resolution over the network, so a document can
//! be parsed without any external fetches.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// The SPL stylesheet reference found in FDA drug-label documents. It
/// points at a remote stylesheet, so it is removed from the raw text
/// before the document is handed to any consumer.
const SPL_STYLESHEET_PI: &str =
    "<?xml-stylesheet type=\"text/xsl\" href=\"https://www.accessdata.fda.gov/spl/stylesheet/spl.xsl\"?>";

pub fn strip_stylesheet_pi(content: &str) -> String {
    content.replace(SPL_STYLESHEET_PI, "")
}

/// One element of a parsed document: local tag name, resolved namespace,
/// attributes in document order, and child nodes in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub nodes: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

impl Element {
    fn new(tag: String, namespace: Option<String>, attributes: Vec<(String, String)>) -> Self {
        Element { tag, namespace, attributes, nodes: Vec::new() }
    }

    /// The value of an attribute, by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// All descendant elements, document order, depth-first pre-order.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// All text content in document order, concatenated, trimmed at the
    /// edges only.
    pub fn itertext(&self) -> String {
        let mut buf = String::new();
        collect_text(self, &mut buf);
        buf.trim().to_string()
    }
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.children() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn collect_text(el: &Element, buf: &mut String) {
    for node in &el.nodes {
        match node {
            XmlNode::Text(text) => buf.push_str(text),
            XmlNode::Element(child) => collect_text(child, buf),
        }
    }
}

/// Parse a document into its root element.
///
/// Namespaces are resolved during the event walk, so each element carries
/// its namespace URI and bare local name. Declarations, comments,
/// processing instructions and doctype events carry no record data and
/// are skipped.
pub fn parse_document(content: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(content);

    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(e))) => {
                stack.push(element_from_start(ns, &e)?);
            }
            Ok((ns, Event::Empty(e))) => {
                let el = element_from_start(ns, &e)?;
                match stack.last_mut() {
                    Some(parent) => parent.nodes.push(XmlNode::Element(el)),
                    // A document whose root is an empty element.
                    None => return Ok(el),
                }
            }
            Ok((_, Event::End(_))) => {
                let Some(el) = stack.pop() else {
                    bail!("Unbalanced closing tag");
                };
                match stack.last_mut() {
                    Some(parent) => parent.nodes.push(XmlNode::Element(el)),
                    None => return Ok(el),
                }
            }
            Ok((_, Event::Text(e))) => {
                let text = e.unescape().context("Failed to unescape text content")?;
                if let Some(parent) = stack.last_mut() {
                    parent.nodes.push(XmlNode::Text(text.into_owned()));
                }
            }
            Ok((_, Event::CData(e))) => {
                let bytes = e.into_inner();
                if let Some(parent) = stack.last_mut() {
                    parent
                        .nodes
                        .push(XmlNode::Text(String::from_utf8_lossy(&bytes).into_owned()));
                }
            }
            Ok((_, Event::Eof)) => bail!("No root element found"),
            Ok(_) => {}
            Err(e) => bail!("XML syntax error: {}", e),
        }
    }
}

fn element_from_start(ns: ResolveResult, e: &BytesStart) -> Result<Element> {
    let tag = String::from_utf8_lossy(e.local_name().into_inner()).into_owned();
    let namespace = match ns {
        ResolveResult::Bound(uri) => {
            Some(String::from_utf8_lossy(uri.into_inner()).into_owned())
        }
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.context("Malformed attribute")?;
        // Namespace declarations are not data attributes.
        let raw_key = attr.key.into_inner();
        if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().into_inner()).into_owned();
        let value = attr
            .unescape_value()
            .context("Failed to unescape attribute value")?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element::new(tag, namespace, attributes))
}
