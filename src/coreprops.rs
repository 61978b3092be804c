//! Core document properties (`/docProps/core.xml`).

use crate::constants::{content_type as ct, namespace};
use crate::error::Result;
use crate::packuri::PackURI;
use crate::part::{Part, XmlPart};
use crate::rel::Relationships;
use crate::xml::XmlElement;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::borrow::Cow;

/// Conventional partname of the core properties part.
pub const CORE_PROPERTIES_URI: &str = "/docProps/core.xml";

/// The core properties part: title, author, revision and timestamps
/// shared by every Office document type.
#[derive(Debug)]
pub struct CorePropertiesPart {
    inner: XmlPart,
}

impl CorePropertiesPart {
    /// Load from raw data.
    pub fn load(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Self> {
        Ok(Self {
            inner: XmlPart::load(partname, content_type, blob)?,
        })
    }

    /// A new part at [`CORE_PROPERTIES_URI`] with a placeholder title,
    /// revision 1 and the current time as the modification date.
    pub fn new_default() -> Result<Self> {
        let mut root = XmlElement::new("cp:coreProperties");
        root.set_attribute("xmlns:cp", namespace::OPC_CORE_PROPERTIES);
        root.set_attribute("xmlns:dc", namespace::DC);
        root.set_attribute("xmlns:dcterms", namespace::DCTERMS);
        root.set_attribute("xmlns:dcmitype", namespace::DCMITYPE);
        root.set_attribute("xmlns:xsi", namespace::XSI);

        let partname = PackURI::new(CORE_PROPERTIES_URI)?;
        let mut part = Self {
            inner: XmlPart::new(partname, ct::OPC_CORE_PROPERTIES.to_string(), root),
        };
        part.set_title("Document");
        part.set_last_modified_by("longan");
        part.set_revision(1);
        part.set_modified(Utc::now());
        Ok(part)
    }

    fn property(&self, name: &str) -> Option<String> {
        let text = self.inner.element().find_child(name)?.text();
        if text.is_empty() { None } else { Some(text) }
    }

    fn property_mut(&mut self, name: &str) -> &mut XmlElement {
        self.inner.element_mut().child_or_append(name)
    }

    /// `dc:title`
    pub fn title(&self) -> Option<String> {
        self.property("dc:title")
    }

    pub fn set_title(&mut self, title: &str) {
        self.property_mut("dc:title").set_text(title);
    }

    /// `dc:creator`
    pub fn creator(&self) -> Option<String> {
        self.property("dc:creator")
    }

    pub fn set_creator(&mut self, creator: &str) {
        self.property_mut("dc:creator").set_text(creator);
    }

    /// `cp:lastModifiedBy`
    pub fn last_modified_by(&self) -> Option<String> {
        self.property("cp:lastModifiedBy")
    }

    pub fn set_last_modified_by(&mut self, name: &str) {
        self.property_mut("cp:lastModifiedBy").set_text(name);
    }

    /// `cp:revision`; None when absent or not a positive integer.
    pub fn revision(&self) -> Option<u32> {
        self.property("cp:revision")?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
    }

    pub fn set_revision(&mut self, revision: u32) {
        self.property_mut("cp:revision")
            .set_text(itoa::Buffer::new().format(revision));
    }

    /// `dcterms:modified`
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        let text = self.property("dcterms:modified")?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_modified(&mut self, modified: DateTime<Utc>) {
        let element = self.property_mut("dcterms:modified");
        element.set_attribute("xsi:type", "dcterms:W3CDTF");
        element.set_text(&modified.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
}

impl Part for CorePropertiesPart {
    fn partname(&self) -> &PackURI {
        self.inner.partname()
    }

    fn set_partname(&mut self, partname: PackURI) {
        self.inner.set_partname(partname);
    }

    fn content_type(&self) -> &str {
        self.inner.content_type()
    }

    fn blob(&self) -> Cow<'_, [u8]> {
        self.inner.blob()
    }

    fn rels(&self) -> &Relationships {
        self.inner.rels()
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        self.inner.rels_mut()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn rel_ref_count(&self, r_id: &str) -> usize {
        self.inner.rel_ref_count(r_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>Quarterly &amp; Annual</dc:title><dc:creator>Ann</dc:creator><cp:revision>7</cp:revision><dcterms:modified xsi:type="dcterms:W3CDTF">2024-03-05T10:20:30Z</dcterms:modified></cp:coreProperties>"#;

    fn load() -> CorePropertiesPart {
        CorePropertiesPart::load(
            PackURI::new(CORE_PROPERTIES_URI).unwrap(),
            ct::OPC_CORE_PROPERTIES.to_string(),
            CORE_XML.as_bytes().to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_read_properties() {
        let part = load();
        assert_eq!(part.title().as_deref(), Some("Quarterly & Annual"));
        assert_eq!(part.creator().as_deref(), Some("Ann"));
        assert_eq!(part.last_modified_by(), None);
        assert_eq!(part.revision(), Some(7));
        assert_eq!(
            part.modified(),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap())
        );
    }

    #[test]
    fn test_write_properties() {
        let mut part = load();
        part.set_title("Plan <draft>");
        part.set_last_modified_by("Bo");
        part.set_revision(8);

        let reloaded = CorePropertiesPart::load(
            part.partname().clone(),
            part.content_type().to_string(),
            part.blob().into_owned(),
        )
        .unwrap();
        assert_eq!(reloaded.title().as_deref(), Some("Plan <draft>"));
        assert_eq!(reloaded.last_modified_by().as_deref(), Some("Bo"));
        assert_eq!(reloaded.revision(), Some(8));
        assert_eq!(reloaded.creator().as_deref(), Some("Ann"));
    }

    #[test]
    fn test_character_references_are_decoded() {
        let xml = CORE_XML.replace("Quarterly &amp; Annual", "caf&#233; &#x41;");
        let part = CorePropertiesPart::load(
            PackURI::new(CORE_PROPERTIES_URI).unwrap(),
            ct::OPC_CORE_PROPERTIES.to_string(),
            xml.into_bytes(),
        )
        .unwrap();
        assert_eq!(part.title().as_deref(), Some("café A"));
    }

    #[test]
    fn test_setting_existing_property_keeps_one_element() {
        let mut part = load();
        part.set_title("First");
        part.set_title("Second");
        part.set_last_modified_by("Bo");
        let root = part.inner.element();
        assert_eq!(root.child_elements().filter(|e| e.name() == "dc:title").count(), 1);
        assert_eq!(root.child_elements().filter(|e| e.name() == "cp:lastModifiedBy").count(), 1);
        assert_eq!(part.title().as_deref(), Some("Second"));
    }

    #[test]
    fn test_new_default() {
        let part = CorePropertiesPart::new_default().unwrap();
        assert_eq!(part.partname().as_str(), CORE_PROPERTIES_URI);
        assert_eq!(part.content_type(), ct::OPC_CORE_PROPERTIES);
        assert_eq!(part.title().as_deref(), Some("Document"));
        assert_eq!(part.revision(), Some(1));
        assert!(part.modified().is_some());
    }
}
