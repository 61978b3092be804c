//! Minimal XML tree used by parts whose content is kept as live XML.

pub mod element;
pub mod escape;

pub use element::{XML_DECLARATION, XmlElement, XmlNode};
pub use escape::{escape_xml, unescape_xml};
