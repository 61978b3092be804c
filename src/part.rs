//! Open Packaging Convention (OPC) objects related to package parts.
//!
//! This module provides the Part trait and its two general-purpose
//! implementations: [`BlobPart`] for opaque content and [`XmlPart`] for parts
//! whose content is held as a parsed XML tree.

use crate::constants::namespace;
use crate::error::{OpcError, Result};
use crate::packuri::PackURI;
use crate::rel::{PartId, RelTarget, Relationships};
use crate::xml::XmlElement;
use memchr::memmem;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;

/// Trait representing a part in an OPC package.
///
/// Parts are the fundamental units of content in an OPC package. Each part
/// has a unique partname (PackURI), a content type, and may have relationships
/// to other parts. Parts are owned by a [`Package`](crate::Package) and
/// refer to each other through [`PartId`] handles.
pub trait Part: Any + std::fmt::Debug {
    /// Get the partname of this part.
    fn partname(&self) -> &PackURI;

    /// Assign a new partname.
    fn set_partname(&mut self, partname: PackURI);

    /// Get the content type of this part.
    fn content_type(&self) -> &str;

    /// Get the binary content of this part.
    ///
    /// Parts backed by live state serialize it on each call.
    fn blob(&self) -> Cow<'_, [u8]>;

    /// Get the relationships for this part.
    fn rels(&self) -> &Relationships;

    /// Get mutable access to the relationships for this part.
    fn rels_mut(&mut self) -> &mut Relationships;

    /// Upcast for downcasting to a concrete part type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to a concrete part type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once every part of a package being loaded exists and every
    /// relationship has been attached.
    fn after_unmarshal(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called on every reachable part right before the package is written.
    fn before_marshal(&mut self) -> Result<()> {
        Ok(())
    }

    /// Count references to a relationship ID in the part content.
    ///
    /// The default searches the raw blob for `r:id="<r_id>"`.
    fn rel_ref_count(&self, r_id: &str) -> usize {
        let blob = self.blob();
        let pattern = format!(r#"r:id="{}""#, r_id);
        memmem::find_iter(&blob, pattern.as_bytes()).count()
    }

    /// Attach a relationship read from a package, keeping its rId.
    fn load_rel(&mut self, reltype: &str, target: RelTarget, r_id: &str) {
        self.rels_mut()
            .add_relationship(reltype.to_string(), target, r_id.to_string());
    }

    /// Add or get a relationship to another part.
    ///
    /// If a relationship of the given type to the target already exists,
    /// returns its rId. Otherwise, creates a new relationship and returns
    /// the new rId.
    fn relate_to(&mut self, target: PartId, reltype: &str) -> String {
        self.rels_mut().get_or_add(reltype, target).r_id().to_string()
    }

    /// Add or get an external relationship.
    fn relate_to_ext(&mut self, target_url: &str, reltype: &str) -> String {
        self.rels_mut().get_or_add_ext_rel(reltype, target_url)
    }

    /// Target part of the single relationship of a type from this part.
    fn part_related_by(&self, reltype: &str) -> Result<PartId> {
        self.rels().part_with_reltype(reltype)
    }

    /// Mapping of rId to target part for this part's internal relationships.
    fn related_parts(&self) -> &HashMap<String, PartId> {
        self.rels().related_parts()
    }

    /// Remove a relationship unless the part content still refers to it.
    ///
    /// The relationship is removed only when fewer than two references to the
    /// rId remain in the content; returns whether it was removed.
    fn drop_rel(&mut self, r_id: &str) -> bool {
        if self.rel_ref_count(r_id) < 2 {
            self.rels_mut().remove(r_id).is_some()
        } else {
            false
        }
    }
}

/// A basic implementation of a Part that stores binary content.
///
/// This is the default part type for content no registered variant claims.
/// The bytes are written back exactly as they were read.
#[derive(Debug)]
pub struct BlobPart {
    /// The partname (URI) of this part
    partname: PackURI,

    /// The content type of this part
    content_type: String,

    /// The binary content of this part
    blob: Vec<u8>,

    /// Relationships from this part to other parts
    rels: Relationships,
}

impl BlobPart {
    /// Create a new BlobPart.
    pub fn new(partname: PackURI, content_type: String, blob: Vec<u8>) -> Self {
        Self {
            partname,
            content_type,
            blob,
            rels: Relationships::new(),
        }
    }

    /// Load a part from raw data.
    pub fn load(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Self> {
        Ok(Self::new(partname, content_type, blob))
    }

    /// Replace the binary content.
    pub fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = blob;
    }
}

impl Part for BlobPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn set_partname(&mut self, partname: PackURI) {
        self.partname = partname;
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.blob)
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A part whose content is a parsed XML tree.
///
/// The element is the live state; the blob is produced by serializing it.
#[derive(Debug)]
pub struct XmlPart {
    /// The partname (URI) of this part
    partname: PackURI,

    /// The content type of this part
    content_type: String,

    /// Root element of the part content
    element: XmlElement,

    /// Relationships from this part to other parts
    rels: Relationships,
}

impl XmlPart {
    /// Create a new XmlPart around an element.
    pub fn new(partname: PackURI, content_type: String, element: XmlElement) -> Self {
        Self {
            partname,
            content_type,
            element,
            rels: Relationships::new(),
        }
    }

    /// Load an XML part from raw data, parsing it eagerly.
    ///
    /// # Errors
    ///
    /// [`OpcError::Xml`] when the blob is not well-formed, naming the part.
    pub fn load(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Self> {
        let element = XmlElement::parse(&blob)
            .map_err(|e| OpcError::Xml(format!("{}: {}", partname, e)))?;
        Ok(Self::new(partname, content_type, element))
    }

    /// Root element of the part content.
    #[inline]
    pub fn element(&self) -> &XmlElement {
        &self.element
    }

    /// Mutable access to the root element.
    #[inline]
    pub fn element_mut(&mut self) -> &mut XmlElement {
        &mut self.element
    }
}

impl Part for XmlPart {
    fn partname(&self) -> &PackURI {
        &self.partname
    }

    fn set_partname(&mut self, partname: PackURI) {
        self.partname = partname;
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn blob(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.element.to_xml().into_bytes())
    }

    fn rels(&self) -> &Relationships {
        &self.rels
    }

    fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    /// Counts `r:id` attributes (office relationships namespace) holding `r_id`.
    fn rel_ref_count(&self, r_id: &str) -> usize {
        self.element
            .count_ns_attributes(namespace::OFC_RELATIONSHIPS, "id", r_id)
    }
}
