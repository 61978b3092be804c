//! Package writer for OPC packages.
//!
//! This module serializes a [`Package`] to a ZIP archive: the
//! [Content_Types].xml manifest, the package relationships, and every
//! reachable part with its relationships.

use crate::constants::{DEFAULT_CONTENT_TYPES, content_type as ct, namespace};
use crate::error::{OpcError, Result};
use crate::package::Package;
use crate::packuri::{CONTENT_TYPES_URI, PackURI};
use crate::part::Part;
use crate::phys_pkg::PhysPkgWriter;
use crate::pkgreader::ContentTypeMap;
use crate::xml::escape_xml;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, trace};

/// Compression applied to every archive member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

/// Options for saving a package.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub compression: Compression,
}

/// Package writer that serializes an OPC package to a ZIP archive.
///
/// Writes, in order:
/// - [Content_Types].xml
/// - _rels/.rels (package relationships)
/// - each reachable part, followed by its relationships if it has any
///
/// The archive is assembled in memory; the destination is written in a single
/// call once serialization has succeeded.
///
/// # Example
///
/// ```no_run
/// use longan::Package;
/// use longan::pkgwriter::{PackageWriter, SaveOptions};
///
/// let pkg = Package::open("input.docx")?;
/// PackageWriter::write("output.docx", &pkg, &SaveOptions::default())?;
/// # Ok::<(), longan::OpcError>(())
/// ```
pub struct PackageWriter;

impl PackageWriter {
    /// Write an OPC package to a file.
    pub fn write<P: AsRef<Path>>(path: P, package: &Package, options: &SaveOptions) -> Result<()> {
        let path = path.as_ref();
        let bytes = Self::to_bytes(package, options)?;
        std::fs::write(path, bytes)
            .map_err(|e| OpcError::Write(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "package saved");
        Ok(())
    }

    /// Write an OPC package to a stream.
    pub fn write_to_stream<W: std::io::Write>(
        mut writer: W,
        package: &Package,
        options: &SaveOptions,
    ) -> Result<()> {
        let bytes = Self::to_bytes(package, options)?;
        writer
            .write_all(&bytes)
            .map_err(|e| OpcError::Write(e.to_string()))?;
        Ok(())
    }

    /// Serialize an OPC package to bytes.
    ///
    /// # Errors
    ///
    /// [`OpcError::Write`] when a reachable part has an empty content type,
    /// two reachable parts share a partname, or a relationship targets a part
    /// the package does not hold.
    pub fn to_bytes(package: &Package, options: &SaveOptions) -> Result<Vec<u8>> {
        let parts: Vec<&dyn Part> = package.iter_parts().collect();
        Self::check_partnames(&parts)?;

        let cti = ContentTypesItem::from_parts(parts.iter().copied())?;
        Self::check_manifest(&cti, &parts)?;

        let mut phys_writer = PhysPkgWriter::new();
        let mut write = |pack_uri: &PackURI, blob: &[u8]| match options.compression {
            Compression::Deflated => phys_writer.write(pack_uri, blob),
            Compression::Stored => phys_writer.write_stored(pack_uri, blob),
        };

        let content_types_uri = PackURI::new(CONTENT_TYPES_URI)?;
        write(&content_types_uri, cti.to_xml().as_bytes())?;

        let partname_of = |id| package.part(id).map(|part| part.partname());

        let package_uri = PackURI::package();
        let pkg_rels_xml = package
            .rels()
            .to_xml(package_uri.base_uri(), partname_of)?;
        write(&package_uri.rels_uri(), pkg_rels_xml.as_bytes())?;

        for part in &parts {
            let blob = part.blob();
            write(part.partname(), &blob[..])?;

            if !part.rels().is_empty() {
                let rels_xml = part
                    .rels()
                    .to_xml(part.partname().base_uri(), partname_of)?;
                write(&part.partname().rels_uri(), rels_xml.as_bytes())?;
            }
        }

        debug!(
            parts = parts.len(),
            compression = ?options.compression,
            "package serialized"
        );
        phys_writer.finish()
    }

    /// Reject two reachable parts that would land on the same archive member.
    fn check_partnames(parts: &[&dyn Part]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(parts.len());
        for part in parts {
            if !seen.insert(part.partname().as_str()) {
                return Err(OpcError::Write(format!(
                    "two parts share the partname '{}'",
                    part.partname()
                )));
            }
        }
        Ok(())
    }

    /// Every written part must resolve through the manifest being written.
    fn check_manifest(cti: &ContentTypesItem, parts: &[&dyn Part]) -> Result<()> {
        let manifest = cti.to_content_type_map();
        for part in parts {
            let resolved = manifest
                .resolve(part.partname())
                .map_err(|e| OpcError::Write(e.to_string()))?;
            if resolved != part.content_type() {
                return Err(OpcError::Write(format!(
                    "manifest resolves '{}' to '{}', part declares '{}'",
                    part.partname(),
                    resolved,
                    part.content_type()
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [Content_Types].xml content.
///
/// Holds Default elements (by extension) and Override elements (by
/// partname).
#[derive(Debug, Clone)]
pub struct ContentTypesItem {
    /// Default content types by extension
    defaults: HashMap<String, String>,

    /// Override content types by partname
    overrides: HashMap<String, String>,
}

impl ContentTypesItem {
    /// An item holding only the `rels` and `xml` defaults.
    pub fn new() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("rels".to_string(), ct::OPC_RELATIONSHIPS.to_string());
        defaults.insert("xml".to_string(), ct::XML.to_string());

        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    /// Build the manifest entries for a set of parts.
    ///
    /// # Errors
    ///
    /// [`OpcError::Write`] when a part has an empty content type.
    pub fn from_parts<'a, I>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a dyn Part>,
    {
        let mut cti = Self::new();
        for part in parts {
            if part.content_type().is_empty() {
                return Err(OpcError::Write(format!(
                    "part '{}' has no content type",
                    part.partname()
                )));
            }
            cti.add_content_type(part.partname(), part.content_type());
        }
        Ok(cti)
    }

    /// Record a part's content type.
    ///
    /// Uses a Default when the pair is a well-known one and the extension has
    /// no different Default yet; otherwise an Override for the partname.
    fn add_content_type(&mut self, partname: &PackURI, content_type: &str) {
        let ext = partname.ext();

        let default_free = self
            .defaults
            .get(ext.as_ref())
            .is_none_or(|existing| existing == content_type);
        if default_free && Self::is_default_content_type(&ext, content_type) {
            trace!(ext = %ext, content_type, "manifest default");
            self.defaults
                .insert(ext.into_owned(), content_type.to_string());
        } else {
            trace!(partname = %partname, content_type, "manifest override");
            self.overrides
                .insert(partname.to_string(), content_type.to_string());
        }
    }

    /// Check if an extension/content-type pair is a standard default.
    fn is_default_content_type(ext: &str, content_type: &str) -> bool {
        DEFAULT_CONTENT_TYPES
            .iter()
            .any(|&(e, c)| e == ext && c == content_type)
    }

    /// The lookup table this item describes.
    pub fn to_content_type_map(&self) -> ContentTypeMap {
        let mut map = ContentTypeMap::new();
        for (ext, content_type) in &self.defaults {
            map.add_default(ext, content_type);
        }
        for (partname, content_type) in &self.overrides {
            map.add_override(partname, content_type);
        }
        map
    }

    /// Generate the XML for [Content_Types].xml.
    ///
    /// Defaults are sorted by extension and Overrides by partname.
    pub fn to_xml(&self) -> String {
        let mut xml =
            String::with_capacity(256 + (self.defaults.len() + self.overrides.len()) * 128);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(r#"<Types xmlns=""#);
        xml.push_str(namespace::OPC_CONTENT_TYPES);
        xml.push_str(r#"">"#);

        let mut exts: Vec<_> = self.defaults.keys().collect();
        exts.sort();
        for ext in exts {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(&self.defaults[ext])
            ));
        }

        let mut partnames: Vec<_> = self.overrides.keys().collect();
        partnames.sort();
        for partname in partnames {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(partname),
                escape_xml(&self.overrides[partname])
            ));
        }

        xml.push_str("</Types>");

        xml
    }
}

impl Default for ContentTypesItem {
    fn default() -> Self {
        Self::new()
    }
}
