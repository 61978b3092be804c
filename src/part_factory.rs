//! Selection of the concrete [`Part`] type for parts read from a package.
//!
//! A [`PartFactory`] is an explicit registry handed to the package reader, so
//! loads with different variant sets never observe each other's registrations.

use crate::constants::content_type as ct;
use crate::coreprops::CorePropertiesPart;
use crate::error::Result;
use crate::packuri::PackURI;
use crate::part::{BlobPart, Part, XmlPart};
use std::collections::HashMap;

/// Constructor for one part variant: `(partname, content_type, blob)`.
pub type PartConstructor = fn(PackURI, String, Vec<u8>) -> Result<Box<dyn Part>>;

/// Hook consulted before the content-type table with `(content_type, reltype)`.
pub type PartSelector = Box<dyn Fn(&str, &str) -> Option<PartConstructor> + Send + Sync>;

/// Registry mapping content types to part constructors.
///
/// Dispatch order for each part:
/// 1. the selector, if one is set and it returns a constructor;
/// 2. the constructor registered for the content type;
/// 3. [`BlobPart`].
pub struct PartFactory {
    part_type_for: HashMap<String, PartConstructor>,
    selector: Option<PartSelector>,
}

impl PartFactory {
    /// Create a factory with no registrations; every part loads as a [`BlobPart`].
    pub fn new() -> Self {
        Self {
            part_type_for: HashMap::new(),
            selector: None,
        }
    }

    /// Register the constructor used for a content type, replacing any
    /// previous registration.
    pub fn register(&mut self, content_type: &str, constructor: PartConstructor) -> &mut Self {
        self.part_type_for
            .insert(content_type.to_string(), constructor);
        self
    }

    /// Set the selector hook, consulted before the content-type table.
    pub fn with_selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&str, &str) -> Option<PartConstructor> + Send + Sync + 'static,
    {
        self.selector = Some(Box::new(selector));
        self
    }

    /// Whether a content type has a registered constructor.
    pub fn is_registered(&self, content_type: &str) -> bool {
        self.part_type_for.contains_key(content_type)
    }

    /// Construct the part for one serialized part.
    ///
    /// `reltype` is the type of the relationship through which the part was
    /// first reached while walking the package.
    pub fn load(
        &self,
        partname: PackURI,
        content_type: String,
        reltype: &str,
        blob: Vec<u8>,
    ) -> Result<Box<dyn Part>> {
        let constructor = self
            .selector
            .as_ref()
            .and_then(|select| select(&content_type, reltype))
            .or_else(|| self.part_type_for.get(&content_type).copied())
            .unwrap_or(blob_part);
        constructor(partname, content_type, blob)
    }
}

impl Default for PartFactory {
    /// A factory that knows the core-properties part.
    fn default() -> Self {
        let mut factory = Self::new();
        factory.register(ct::OPC_CORE_PROPERTIES, core_properties_part);
        factory
    }
}

impl std::fmt::Debug for PartFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut content_types: Vec<&String> = self.part_type_for.keys().collect();
        content_types.sort();
        f.debug_struct("PartFactory")
            .field("content_types", &content_types)
            .field("selector", &self.selector.is_some())
            .finish()
    }
}

/// [`PartConstructor`] for [`BlobPart`].
pub fn blob_part(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Box<dyn Part>> {
    Ok(Box::new(BlobPart::load(partname, content_type, blob)?))
}

/// [`PartConstructor`] for [`XmlPart`].
pub fn xml_part(partname: PackURI, content_type: String, blob: Vec<u8>) -> Result<Box<dyn Part>> {
    Ok(Box::new(XmlPart::load(partname, content_type, blob)?))
}

/// [`PartConstructor`] for [`CorePropertiesPart`].
pub fn core_properties_part(
    partname: PackURI,
    content_type: String,
    blob: Vec<u8>,
) -> Result<Box<dyn Part>> {
    Ok(Box::new(CorePropertiesPart::load(partname, content_type, blob)?))
}
