//! A small owned XML tree used as the live state of XML parts.
//!
//! Attribute values and character data are kept in their escaped source form,
//! so a part that is loaded and saved without edits serializes back to the
//! same markup (modulo the XML declaration). Accessors unescape on read and
//! setters escape on write.

use crate::error::{OpcError, Result};
use crate::xml::escape::{escape_xml, unescape_xml};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// The XML declaration written ahead of every serialized part.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// A child node of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Character data, escaped
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. "w:document"
    name: String,

    /// (qualified name, escaped value) in document order
    attributes: Vec<(String, String)>,

    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an empty element.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a document and return its root element.
    ///
    /// Prolog and epilog content (declaration, doctype, comments outside the
    /// root) is dropped.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::with_capacity(512);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => stack.push(Self::from_start(e)?),
                Ok(Event::Empty(ref e)) => {
                    let element = Self::from_start(e)?;
                    Self::attach(&mut stack, &mut root, element)?;
                },
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| OpcError::Xml("unexpected end tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, element)?;
                },
                Ok(Event::Text(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.push_raw_text(std::str::from_utf8(e.as_ref())?);
                    }
                },
                Ok(Event::GeneralRef(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let name = std::str::from_utf8(e.as_ref())?;
                        parent.push_raw_text(&format!("&{};", name));
                    }
                },
                Ok(Event::CData(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(e.as_ref())?.to_string();
                        parent.children.push(XmlNode::CData(text));
                    }
                },
                Ok(Event::Comment(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(e.as_ref())?.to_string();
                        parent.children.push(XmlNode::Comment(text));
                    }
                },
                Ok(Event::PI(ref e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = std::str::from_utf8(e.as_ref())?.to_string();
                        parent.children.push(XmlNode::ProcessingInstruction(text));
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::Xml(format!(
                        "parse error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(OpcError::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| OpcError::Xml("document has no root element".to_string()))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            attributes.push((
                std::str::from_utf8(attr.key.as_ref())?.to_string(),
                std::str::from_utf8(&attr.value)?.to_string(),
            ));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        element: XmlElement,
    ) -> Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(XmlNode::Element(element)),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(OpcError::Xml(format!(
                    "second root element <{}>",
                    element.name
                )));
            },
        }
        Ok(())
    }

    /// Append escaped text, merging with a preceding text node.
    fn push_raw_text(&mut self, raw: &str) {
        if let Some(XmlNode::Text(text)) = self.children.last_mut() {
            text.push_str(raw);
        } else {
            self.children.push(XmlNode::Text(raw.to_string()));
        }
    }

    /// Qualified name, e.g. "cp:coreProperties".
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Unescaped value of an attribute, by qualified name.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| unescape_xml(value))
    }

    /// Set an attribute, replacing any existing value.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let escaped = escape_xml(value);
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = escaped,
            None => self.attributes.push((name.to_string(), escaped)),
        }
    }

    /// Remove an attribute, returning its unescaped value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(key, _)| key == name)?;
        let (_, value) = self.attributes.remove(pos);
        Some(unescape_xml(&value))
    }

    /// Child nodes in document order.
    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Mutable access to the child nodes.
    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with the given qualified name.
    pub fn find_child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|child| child.name == name)
    }

    /// Mutable access to the first child element with the given qualified name.
    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    /// First child element with the given qualified name, appended empty
    /// when there is none.
    pub fn child_or_append(&mut self, name: &str) -> &mut XmlElement {
        let position = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(element) if element.name == name));
        match position {
            Some(index) => match &mut self.children[index] {
                XmlNode::Element(element) => element,
                _ => unreachable!("position matched an element"),
            },
            None => self.append(XmlElement::new(name)),
        }
    }

    /// Append a child element and return a reference to it.
    pub fn append(&mut self, element: XmlElement) -> &mut XmlElement {
        self.children.push(XmlNode::Element(element));
        match self.children.last_mut() {
            Some(XmlNode::Element(element)) => element,
            _ => unreachable!("an element was just pushed"),
        }
    }

    /// Concatenated, unescaped text of the direct text and CDATA children.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(raw) => text.push_str(&unescape_xml(raw)),
                XmlNode::CData(data) => text.push_str(data),
                _ => {},
            }
        }
        text
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(escape_xml(text)));
        }
    }

    /// Count attributes in this subtree whose name is `local` in namespace
    /// `namespace_uri` and whose value equals `value`.
    ///
    /// Prefixes are resolved against the `xmlns:` declarations in scope.
    pub fn count_ns_attributes(&self, namespace_uri: &str, local: &str, value: &str) -> usize {
        let mut scope = Vec::new();
        self.count_ns_attributes_in(&mut scope, namespace_uri, local, value)
    }

    fn count_ns_attributes_in<'a>(
        &'a self,
        scope: &mut Vec<(&'a str, &'a str)>,
        namespace_uri: &str,
        local: &str,
        value: &str,
    ) -> usize {
        let mark = scope.len();
        for (key, uri) in &self.attributes {
            if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((prefix, uri));
            }
        }

        let mut count = 0;
        for (key, raw) in &self.attributes {
            let Some((prefix, name)) = key.split_once(':') else {
                continue;
            };
            if prefix == "xmlns" || name != local || unescape_xml(raw) != value {
                continue;
            }
            let bound = scope
                .iter()
                .rev()
                .find(|(p, _)| *p == prefix)
                .map(|(_, uri)| *uri);
            if bound == Some(namespace_uri) {
                count += 1;
            }
        }

        for child in self.child_elements() {
            count += child.count_ns_attributes_in(scope, namespace_uri, local, value);
        }

        scope.truncate(mark);
        count
    }

    /// Serialize as a standalone document, declaration included.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(XML_DECLARATION.len() + 1024);
        xml.push_str(XML_DECLARATION);
        xml.push('\n');
        self.write_into(&mut xml);
        xml
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            // Values read from single-quoted attributes may hold a bare '"'.
            if value.contains('"') {
                out.push_str(&value.replace('"', "&quot;"));
            } else {
                out.push_str(value);
            }
            out.push('"');
        }

        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for node in &self.children {
            match node {
                XmlNode::Element(element) => element.write_into(out),
                XmlNode::Text(raw) => out.push_str(raw),
                XmlNode::CData(data) => {
                    out.push_str("<![CDATA[");
                    out.push_str(data);
                    out.push_str("]]>");
                },
                XmlNode::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                },
                XmlNode::ProcessingInstruction(text) => {
                    out.push_str("<?");
                    out.push_str(text);
                    out.push_str("?>");
                },
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    #[test]
    fn test_parse_and_serialize_preserves_markup() {
        let src = concat!(
            r#"<w:document xmlns:w="urn:w" xmlns:r="urn:r">"#,
            r#"<w:body><w:p><w:t xml:space="preserve"> a &amp; b &lt;c&gt; </w:t></w:p>"#,
            r#"<!-- note --><w:sectPr/><![CDATA[x<y]]></w:body></w:document>"#
        );
        let root = XmlElement::parse(src.as_bytes()).unwrap();
        assert_eq!(root.name(), "w:document");
        assert_eq!(root.local_name(), "document");

        let xml = root.to_xml();
        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.ends_with(src));
    }

    #[test]
    fn test_text_and_attributes_are_unescaped() {
        let root = XmlElement::parse(br#"<a title="x &amp; y"><b>1 &lt; 2</b></a>"#).unwrap();
        assert_eq!(root.attribute("title").as_deref(), Some("x & y"));
        assert_eq!(root.find_child("b").unwrap().text(), "1 < 2");
        assert_eq!(root.attribute("missing"), None);
    }

    #[test]
    fn test_character_references_in_attributes() {
        let root = XmlElement::parse(br#"<a title="&#x3C;caf&#233;&#62;"/>"#).unwrap();
        assert_eq!(root.attribute("title").as_deref(), Some("<café>"));
    }

    #[test]
    fn test_child_or_append() {
        let mut root = XmlElement::parse(b"<a><!-- c --><b>1</b></a>").unwrap();
        assert_eq!(root.child_or_append("b").text(), "1");
        root.child_or_append("c").set_text("2");
        root.child_or_append("c").set_text("3");
        assert_eq!(root.child_elements().count(), 2);
        assert_eq!(root.find_child("c").unwrap().text(), "3");
    }

    #[test]
    fn test_setters_escape() {
        let mut root = XmlElement::new("a");
        root.set_attribute("href", "https://e.com/?a=1&b=2");
        root.append(XmlElement::new("b")).set_text("<tag>");
        assert_eq!(
            root.to_xml(),
            format!(
                "{}\n{}",
                XML_DECLARATION,
                r#"<a href="https://e.com/?a=1&amp;b=2"><b>&lt;tag&gt;</b></a>"#
            )
        );

        root.set_attribute("href", "x");
        assert_eq!(root.attribute("href").as_deref(), Some("x"));
        assert_eq!(root.remove_attribute("href").as_deref(), Some("x"));
        assert_eq!(root.attribute("href"), None);
    }

    #[test]
    fn test_single_quoted_attribute_round_trip() {
        let root = XmlElement::parse(br#"<a v='say "hi"'/>"#).unwrap();
        assert_eq!(root.attribute("v").as_deref(), Some(r#"say "hi""#));
        let reparsed = XmlElement::parse(root.to_xml().as_bytes()).unwrap();
        assert_eq!(reparsed.attribute("v").as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn test_count_ns_attributes_resolves_prefixes() {
        let src = format!(
            concat!(
                r#"<doc xmlns:r="{ns}" xmlns:x="urn:other">"#,
                r#"<img r:id="rId3"/><link r:id="rId3"/><other x:id="rId3"/>"#,
                r#"<inner xmlns:rel="{ns}"><img rel:id="rId3"/></inner>"#,
                r#"<img r:id="rId4"/></doc>"#
            ),
            ns = R_NS
        );
        let root = XmlElement::parse(src.as_bytes()).unwrap();
        assert_eq!(root.count_ns_attributes(R_NS, "id", "rId3"), 3);
        assert_eq!(root.count_ns_attributes(R_NS, "id", "rId4"), 1);
        assert_eq!(root.count_ns_attributes(R_NS, "id", "rId9"), 0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(XmlElement::parse(b""), Err(OpcError::Xml(_))));
        assert!(matches!(XmlElement::parse(b"<a><b></a>"), Err(OpcError::Xml(_))));
        assert!(matches!(XmlElement::parse(b"<a>"), Err(OpcError::Xml(_))));
        assert!(matches!(XmlElement::parse(b"<a/><b/>"), Err(OpcError::Xml(_))));
    }
}
