//! Low-level, read-only API to a serialized Open Packaging Convention (OPC) package.
//!
//! This module provides the PackageReader, which walks the relationship graph
//! of a physical package and produces one [`SerializedPart`] per reachable part,
//! and the [`ContentTypeMap`] that resolves each part's content type.

use crate::constants::target_mode;
use crate::error::{OpcError, Result};
use crate::packuri::PackURI;
use crate::phys_pkg::PhysPkgReader;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Serialized part with its content and relationships.
///
/// Represents a part as loaded from the physical package, before
/// being converted into a Part object.
#[derive(Debug)]
pub struct SerializedPart {
    /// The partname (URI) of this part
    pub partname: PackURI,

    /// The content type of this part
    pub content_type: String,

    /// The type of the relationship through which the part was first reached
    pub reltype: String,

    /// The binary content of this part
    pub blob: Vec<u8>,

    /// Serialized relationships from this part
    pub srels: SmallVec<[SerializedRelationship; 8]>,
}

/// Serialized relationship as read from a .rels file.
///
/// Contains all relationship information in string form, before
/// being converted into Relationship objects with resolved part references.
#[derive(Debug, Clone)]
pub struct SerializedRelationship {
    /// Base URI for resolving relative references
    pub base_uri: String,

    /// Relationship ID (e.g., "rId1")
    pub r_id: String,

    /// Relationship type URI
    pub reltype: String,

    /// Target reference (relative URI or external URL)
    pub target_ref: String,

    /// Target mode (Internal or External)
    pub target_mode: String,
}

impl SerializedRelationship {
    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == target_mode::EXTERNAL
    }

    /// Get the target partname for internal relationships.
    ///
    /// Resolves the relative target reference against the base URI
    /// to produce an absolute PackURI.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external() {
            return Err(OpcError::InvalidName(format!(
                "external target '{}' has no partname",
                self.target_ref
            )));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref)
    }
}

/// Content type map for looking up content types by part name or extension.
///
/// Implements the OPC content type discovery algorithm using Default and
/// Override elements from [Content_Types].xml. Both lookups are
/// case-insensitive.
#[derive(Debug, Default, Clone)]
pub struct ContentTypeMap {
    /// Maps lowercased file extensions to default content types
    defaults: HashMap<String, String>,

    /// Maps lowercased partnames to override content types
    overrides: HashMap<String, String>,
}

impl ContentTypeMap {
    /// Create a new empty content type map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse content types from [Content_Types].xml.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    match e.local_name().as_ref() {
                        b"Default" => {
                            let (ext, ct) = Self::attr_pair(e, b"Extension")?;
                            match (ext, ct) {
                                (Some(ext), Some(ct)) => map.add_default(&ext, &ct),
                                _ => warn!("skipping Default without Extension or ContentType"),
                            }
                        },
                        b"Override" => {
                            let (pn, ct) = Self::attr_pair(e, b"PartName")?;
                            match (pn, ct) {
                                (Some(pn), Some(ct)) => map.add_override(&pn, &ct),
                                _ => warn!("skipping Override without PartName or ContentType"),
                            }
                        },
                        _ => {},
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::Load(format!(
                        "[Content_Types].xml parse error: {}",
                        e
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(map)
    }

    /// Read the `key` attribute and `ContentType` attribute of an element.
    fn attr_pair(e: &BytesStart<'_>, key: &[u8]) -> Result<(Option<String>, Option<String>)> {
        let mut first = None;
        let mut content_type = None;
        fn malformed(e: impl std::fmt::Display) -> OpcError {
            OpcError::Load(format!("[Content_Types].xml attribute error: {}", e))
        }
        for attr in e.attributes() {
            let attr = attr.map_err(malformed)?;
            let name = attr.key.as_ref();
            if name == key {
                first = Some(attr.unescape_value().map_err(malformed)?.into_owned());
            } else if name == b"ContentType" {
                content_type = Some(attr.unescape_value().map_err(malformed)?.into_owned());
            }
        }
        Ok((first, content_type))
    }

    /// Add a default content type mapping for a file extension.
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .insert(extension.to_lowercase(), content_type.to_string());
    }

    /// Add an override content type mapping for a specific partname.
    pub fn add_override(&mut self, partname: &str, content_type: &str) {
        self.overrides
            .insert(partname.to_lowercase(), content_type.to_string());
    }

    /// Get the content type for a partname.
    ///
    /// First checks for an override, then falls back to the default
    /// based on file extension.
    ///
    /// # Errors
    ///
    /// [`OpcError::NotFound`] when neither table covers the partname.
    pub fn resolve(&self, pack_uri: &PackURI) -> Result<&str> {
        if let Some(ct) = self.overrides.get(&pack_uri.as_str().to_lowercase()) {
            return Ok(ct);
        }

        if let Some(ct) = self.defaults.get(pack_uri.ext().as_ref()) {
            return Ok(ct);
        }

        Err(OpcError::NotFound(format!(
            "no content type for partname '{}' in manifest",
            pack_uri
        )))
    }

    /// Default entries as (extension, content type).
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Override entries as (lowercased partname, content type).
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Package reader that provides access to serialized parts and relationships.
///
/// This is the discovery phase of loading: it walks the relationship graph
/// from the package root and collects every reachable part exactly once.
#[derive(Debug)]
pub struct PackageReader {
    /// Package-level relationships
    pkg_srels: SmallVec<[SerializedRelationship; 8]>,

    /// All serialized parts in the package, in discovery order
    sparts: Vec<SerializedPart>,
}

impl PackageReader {
    /// Read the content-type manifest and walk the relationship graph.
    ///
    /// # Errors
    ///
    /// [`OpcError::Load`] when the manifest is missing or malformed, a
    /// relationship targets a member that does not exist, or a part's content
    /// type cannot be resolved.
    pub fn from_phys_reader(mut phys_reader: PhysPkgReader) -> Result<Self> {
        let content_types = ContentTypeMap::from_xml(phys_reader.content_types_xml()?)?;

        let package_uri = PackURI::package();
        let pkg_srels = Self::srels_for(&phys_reader, &package_uri)?;

        let sparts = Self::load_sparts(&mut phys_reader, &pkg_srels, &content_types)?;
        debug!(
            parts = sparts.len(),
            package_rels = pkg_srels.len(),
            "package graph discovered"
        );

        Ok(Self { pkg_srels, sparts })
    }

    /// Relationships of a source, or none if it has no `.rels` item.
    fn srels_for(
        phys_reader: &PhysPkgReader,
        source_uri: &PackURI,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        match phys_reader.rels_xml_for(source_uri) {
            Some(xml) => Self::parse_rels_xml(xml, source_uri.base_uri())
                .map_err(|e| OpcError::Load(format!("{}: {}", source_uri.rels_uri(), e))),
            None => Ok(SmallVec::new()),
        }
    }

    /// Parse relationships XML into SerializedRelationship structs.
    fn parse_rels_xml(
        rels_xml: &[u8],
        base_uri: &str,
    ) -> Result<SmallVec<[SerializedRelationship; 8]>> {
        let mut srels = SmallVec::new();
        let mut reader = Reader::from_reader(rels_xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"Relationship" {
                        let mut r_id = None;
                        let mut reltype = None;
                        let mut target_ref = None;
                        let mut target_mode = target_mode::INTERNAL.to_string();

                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Id" => r_id = Some(attr.unescape_value()?.into_owned()),
                                b"Type" => reltype = Some(attr.unescape_value()?.into_owned()),
                                b"Target" => target_ref = Some(attr.unescape_value()?.into_owned()),
                                b"TargetMode" => target_mode = attr.unescape_value()?.into_owned(),
                                _ => {},
                            }
                        }

                        if let (Some(id), Some(rt), Some(tr)) = (r_id, reltype, target_ref) {
                            srels.push(SerializedRelationship {
                                base_uri: base_uri.to_string(),
                                r_id: id,
                                reltype: rt,
                                target_ref: tr,
                                target_mode,
                            });
                        } else {
                            warn!(base_uri, "skipping Relationship missing Id, Type or Target");
                        }
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpcError::Xml(format!("rels parse error: {}", e))),
                _ => {},
            }
            buf.clear();
        }

        Ok(srels)
    }

    /// Depth-first walk of internal relationships from the package root.
    ///
    /// A part reachable along several paths, cycles included, is read once.
    fn load_sparts(
        phys_reader: &mut PhysPkgReader,
        pkg_srels: &[SerializedRelationship],
        content_types: &ContentTypeMap,
    ) -> Result<Vec<SerializedPart>> {
        let mut sparts = Vec::with_capacity(32);
        let mut visited: HashSet<PackURI> = HashSet::with_capacity(32);
        let mut work_stack: Vec<(PackURI, String)> = Vec::with_capacity(pkg_srels.len());

        Self::push_targets(pkg_srels, &mut visited, &mut work_stack)?;

        while let Some((partname, reltype)) = work_stack.pop() {
            let part_srels = Self::srels_for(phys_reader, &partname)?;
            Self::push_targets(&part_srels, &mut visited, &mut work_stack)?;

            let content_type = content_types
                .resolve(&partname)
                .map_err(|e| OpcError::Load(e.to_string()))?
                .to_string();
            let blob = phys_reader.take_blob(&partname).ok_or_else(|| {
                OpcError::Load(format!(
                    "relationship target '{}' has no member in the archive",
                    partname
                ))
            })?;

            trace!(partname = %partname, content_type = %content_type, "discovered part");
            sparts.push(SerializedPart {
                partname,
                content_type,
                reltype,
                blob,
                srels: part_srels,
            });
        }

        Ok(sparts)
    }

    /// Queue unvisited internal targets so the first relationship listed is
    /// visited first.
    fn push_targets(
        srels: &[SerializedRelationship],
        visited: &mut HashSet<PackURI>,
        work_stack: &mut Vec<(PackURI, String)>,
    ) -> Result<()> {
        let mut fresh = SmallVec::<[(PackURI, String); 8]>::new();
        for srel in srels.iter().filter(|srel| !srel.is_external()) {
            let partname = srel
                .target_partname()
                .map_err(|e| OpcError::Load(format!("relationship '{}': {}", srel.r_id, e)))?;
            if visited.insert(partname.clone()) {
                fresh.push((partname, srel.reltype.clone()));
            }
        }
        work_stack.extend(fresh.into_iter().rev());
        Ok(())
    }

    /// Get an iterator over all serialized parts.
    pub fn iter_sparts(&self) -> impl Iterator<Item = &SerializedPart> {
        self.sparts.iter()
    }

    /// Get package-level relationships.
    pub fn pkg_srels(&self) -> &[SerializedRelationship] {
        &self.pkg_srels
    }

    /// Take ownership of the package relationships and serialized parts.
    pub fn into_parts(self) -> (SmallVec<[SerializedRelationship; 8]>, Vec<SerializedPart>) {
        (self.pkg_srels, self.sparts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_pkg::PhysPkgWriter;

    const CT_XML: &[u8] = br#"<?xml version="1.0"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="XML" ContentType="application/xml"/>
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Override PartName="/Word/Document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

    fn rels(entries: &[(&str, &str, &str, bool)]) -> Vec<u8> {
        let mut xml = String::from(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (id, reltype, target, external) in entries {
            let mode = if *external { r#" TargetMode="External""# } else { "" };
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                id, reltype, target, mode
            ));
        }
        xml.push_str("</Relationships>");
        xml.into_bytes()
    }

    fn build(members: &[(&str, Vec<u8>)]) -> PhysPkgReader {
        let mut writer = PhysPkgWriter::new();
        for (name, blob) in members {
            writer.write(&PackURI::new(*name).unwrap(), blob).unwrap();
        }
        PhysPkgReader::from_bytes(&writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_content_type_map() {
        let ct_map = ContentTypeMap::from_xml(CT_XML).unwrap();

        let uri = PackURI::new("/test.xml").unwrap();
        assert_eq!(ct_map.resolve(&uri).unwrap(), "application/xml");

        let uri = PackURI::new("/foo/bar.XML").unwrap();
        assert_eq!(ct_map.resolve(&uri).unwrap(), "application/xml");

        let uri = PackURI::new("/word/document.xml").unwrap();
        assert_eq!(
            ct_map.resolve(&uri).unwrap(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"
        );

        let uri = PackURI::new("/word/media/image1.png").unwrap();
        assert!(matches!(ct_map.resolve(&uri), Err(OpcError::NotFound(_))));
    }

    #[test]
    fn test_malformed_manifest_attribute_is_load_error() {
        let xml = br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="xml" Extension="rels" ContentType="application/xml"/>
</Types>"#;
        let err = ContentTypeMap::from_xml(xml).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)), "{err}");

        let xml = br#"<Types><Override PartName="/a.xml" ContentType="text/&bogus;"/></Types>"#;
        let err = ContentTypeMap::from_xml(xml).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)), "{err}");
    }

    #[test]
    fn test_override_wins_over_default() {
        let mut ct_map = ContentTypeMap::new();
        ct_map.add_default("xml", "application/xml");
        ct_map.add_override("/foo/bar.xml", "application/special+xml");

        let uri = PackURI::new("/foo/bar.xml").unwrap();
        assert_eq!(ct_map.resolve(&uri).unwrap(), "application/special+xml");
        let uri = PackURI::new("/foo/baz.xml").unwrap();
        assert_eq!(ct_map.resolve(&uri).unwrap(), "application/xml");
    }

    #[test]
    fn test_walk_visits_shared_and_cyclic_parts_once() {
        let phys = build(&[
            ("/[Content_Types].xml", CT_XML.to_vec()),
            ("/_rels/.rels", rels(&[
                ("rId1", "officeDocument", "word/document.xml", false),
                ("rId2", "extra", "word/styles.xml", false),
            ])),
            ("/word/document.xml", b"<document/>".to_vec()),
            ("/word/_rels/document.xml.rels", rels(&[
                ("rId1", "styles", "styles.xml", false),
                ("rId2", "hyperlink", "https://example.com/", true),
            ])),
            ("/word/styles.xml", b"<styles/>".to_vec()),
            ("/word/_rels/styles.xml.rels", rels(&[("rId1", "back", "document.xml", false)])),
        ]);

        let reader = PackageReader::from_phys_reader(phys).unwrap();
        let names: Vec<&str> = reader.iter_sparts().map(|s| s.partname.as_str()).collect();
        assert_eq!(names, vec!["/word/document.xml", "/word/styles.xml"]);

        let document = reader.iter_sparts().next().unwrap();
        assert_eq!(document.reltype, "officeDocument");
        assert_eq!(document.srels.len(), 2);
        assert!(document.srels[1].is_external());
        assert_eq!(reader.pkg_srels().len(), 2);
    }

    #[test]
    fn test_dangling_target_is_load_error() {
        let phys = build(&[
            ("/[Content_Types].xml", CT_XML.to_vec()),
            ("/_rels/.rels", rels(&[("rId1", "officeDocument", "word/document.xml", false)])),
        ]);
        let err = PackageReader::from_phys_reader(phys).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)), "{err}");
    }

    #[test]
    fn test_unresolvable_content_type_is_load_error() {
        let phys = build(&[
            ("/[Content_Types].xml", CT_XML.to_vec()),
            ("/_rels/.rels", rels(&[("rId1", "thumbnail", "docProps/thumbnail.jpeg", false)])),
            ("/docProps/thumbnail.jpeg", vec![0xFF, 0xD8]),
        ]);
        let err = PackageReader::from_phys_reader(phys).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)), "{err}");
    }

    #[test]
    fn test_missing_rels_means_no_relationships() {
        let phys = build(&[("/[Content_Types].xml", CT_XML.to_vec())]);
        let reader = PackageReader::from_phys_reader(phys).unwrap();
        assert!(reader.pkg_srels().is_empty());
        assert_eq!(reader.iter_sparts().count(), 0);
    }
}
