//! Relationship-related objects for OPC packages.
//!
//! This module provides types for managing relationships between parts in an OPC package,
//! including internal and external relationships.

use crate::error::{OpcError, Result};
use crate::packuri::PackURI;
use crate::xml::escape::escape_xml;
use std::collections::HashMap;

/// Handle to a part held by a [`Package`](crate::Package).
///
/// Handles are only meaningful for the package that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub(crate) usize);

impl PartId {
    /// Position of the part in its package's part arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The target end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelTarget {
    /// Another part in the same package
    Part(PartId),
    /// A URI outside the package, kept verbatim
    External(String),
}

/// A single relationship from a source part to a target.
///
/// Represents a connection between parts in an OPC package, identified by an rId
/// (relationship ID). Can be either internal (pointing to another part) or external
/// (pointing to an external URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    /// Target part or external URL
    target: RelTarget,
}

impl Relationship {
    /// Create a new relationship.
    pub fn new(r_id: String, reltype: String, target: RelTarget) -> Self {
        Self {
            r_id,
            reltype,
            target,
        }
    }

    /// Get the relationship ID.
    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Get the relationship type.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Get the relationship target.
    #[inline]
    pub fn target(&self) -> &RelTarget {
        &self.target
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.target, RelTarget::External(_))
    }

    /// Target part of an internal relationship.
    #[inline]
    pub fn target_part(&self) -> Option<PartId> {
        match self.target {
            RelTarget::Part(id) => Some(id),
            RelTarget::External(_) => None,
        }
    }

    /// Target URL of an external relationship.
    #[inline]
    pub fn target_url(&self) -> Option<&str> {
        match &self.target {
            RelTarget::External(url) => Some(url),
            RelTarget::Part(_) => None,
        }
    }
}

/// Collection of relationships from a single source.
///
/// Keyed by relationship ID, with a secondary index from rId to target part
/// for internal relationships.
#[derive(Debug, Default, Clone)]
pub struct Relationships {
    /// Map of relationship ID to Relationship
    rels: HashMap<String, Relationship>,

    /// rId -> target part, internal relationships only
    target_parts: HashMap<String, PartId>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relationship to the collection.
    ///
    /// Inserts unconditionally; an existing relationship with the same rId is
    /// replaced.
    pub fn add_relationship(
        &mut self,
        reltype: String,
        target: RelTarget,
        r_id: String,
    ) -> &Relationship {
        match target {
            RelTarget::Part(id) => {
                self.target_parts.insert(r_id.clone(), id);
            },
            RelTarget::External(_) => {
                self.target_parts.remove(&r_id);
            },
        }
        let rel = Relationship::new(r_id.clone(), reltype, target);
        self.rels.entry(r_id).insert_entry(rel).into_mut()
    }

    /// Get a relationship by its ID.
    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.get(r_id)
    }

    /// Check whether a relationship with the given ID exists.
    #[inline]
    pub fn contains(&self, r_id: &str) -> bool {
        self.rels.contains_key(r_id)
    }

    /// Get or add a relationship to a target part.
    ///
    /// If an internal relationship of the given type to the target already
    /// exists, returns that relationship. Otherwise, creates a new one with the
    /// next available rId.
    pub fn get_or_add(&mut self, reltype: &str, target: PartId) -> &Relationship {
        let existing = self
            .rels
            .values()
            .find(|rel| rel.reltype() == reltype && rel.target_part() == Some(target))
            .map(|rel| rel.r_id().to_string());

        let r_id = match existing {
            Some(r_id) => r_id,
            None => {
                let r_id = self.next_r_id();
                self.add_relationship(reltype.to_string(), RelTarget::Part(target), r_id.clone());
                r_id
            },
        };
        &self.rels[&r_id]
    }

    /// Get or add an external relationship, returning its rId.
    ///
    /// Similar to `get_or_add` but matches on external relationships only.
    pub fn get_or_add_ext_rel(&mut self, reltype: &str, target_url: &str) -> String {
        if let Some(rel) = self
            .rels
            .values()
            .find(|rel| rel.reltype() == reltype && rel.target_url() == Some(target_url))
        {
            return rel.r_id().to_string();
        }

        let r_id = self.next_r_id();
        self.add_relationship(
            reltype.to_string(),
            RelTarget::External(target_url.to_string()),
            r_id.clone(),
        );
        r_id
    }

    /// Get the next available relationship ID.
    ///
    /// Probes "rId1" through "rId{len + 1}" and returns the first one not in
    /// use, so ids freed by removal are handed out again.
    pub fn next_r_id(&self) -> String {
        (1..=self.rels.len() + 1)
            .map(|n| format!("rId{}", n))
            .find(|candidate| !self.rels.contains_key(candidate))
            // One of len + 1 candidates is always free.
            .unwrap_or_else(|| format!("rId{}", self.rels.len() + 1))
    }

    /// Get the target part of the single internal relationship of a type.
    ///
    /// # Errors
    ///
    /// [`OpcError::NotFound`] if no relationship of the type exists,
    /// [`OpcError::Ambiguous`] if more than one does.
    pub fn part_with_reltype(&self, reltype: &str) -> Result<PartId> {
        let mut matching = self
            .rels
            .values()
            .filter(|rel| rel.reltype() == reltype)
            .filter_map(Relationship::target_part);

        match (matching.next(), matching.next()) {
            (None, _) => Err(OpcError::NotFound(format!(
                "no relationship of type '{}'",
                reltype
            ))),
            (Some(id), None) => Ok(id),
            (Some(_), Some(_)) => Err(OpcError::Ambiguous(format!(
                "multiple relationships of type '{}'",
                reltype
            ))),
        }
    }

    /// Mapping of rId to target part for internal relationships.
    #[inline]
    pub fn related_parts(&self) -> &HashMap<String, PartId> {
        &self.target_parts
    }

    /// Get an iterator over all relationships, ordered by rId.
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        let mut rels: Vec<&Relationship> = self.rels.values().collect();
        rels.sort_by(|a, b| r_id_sort_key(a.r_id()).cmp(&r_id_sort_key(b.r_id())));
        rels.into_iter()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Remove a relationship by its ID.
    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        self.target_parts.remove(r_id);
        self.rels.remove(r_id)
    }

    /// Serialize relationships to XML format.
    ///
    /// Internal targets are written relative to `base_uri`, the directory of
    /// the source part. `partname_of` resolves target handles to partnames.
    ///
    /// # Errors
    ///
    /// [`OpcError::Write`] if an internal target cannot be resolved.
    pub fn to_xml<'p, F>(&self, base_uri: &str, partname_of: F) -> Result<String>
    where
        F: Fn(PartId) -> Option<&'p PackURI>,
    {
        let mut xml = String::with_capacity(128 + self.rels.len() * 160);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(r#"<Relationships xmlns=""#);
        xml.push_str(crate::constants::namespace::OPC_RELATIONSHIPS);
        xml.push_str(r#"">"#);

        for rel in self.iter() {
            let (target_ref, target_mode) = match rel.target() {
                RelTarget::External(url) => (url.clone(), r#" TargetMode="External""#),
                RelTarget::Part(id) => {
                    let partname = partname_of(*id).ok_or_else(|| {
                        OpcError::Write(format!(
                            "relationship '{}' targets a part not held by the package",
                            rel.r_id()
                        ))
                    })?;
                    (partname.relative_ref(base_uri), "")
                },
            };

            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(rel.r_id()),
                escape_xml(rel.reltype()),
                escape_xml(&target_ref),
                target_mode
            ));
        }

        xml.push_str("</Relationships>");

        Ok(xml)
    }
}

/// Orders "rId2" before "rId10"; ids without a numeric suffix sort last.
fn r_id_sort_key(r_id: &str) -> (u64, &str) {
    let num = r_id
        .strip_prefix("rId")
        .and_then(|digits| atoi_simd::parse::<u64>(digits.as_bytes()).ok())
        .unwrap_or(u64::MAX);
    (num, r_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part(n: usize) -> PartId {
        PartId(n)
    }

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new(
            "rId1".to_string(),
            "http://example.com/rel".to_string(),
            RelTarget::Part(part(0)),
        );

        assert_eq!(rel.r_id(), "rId1");
        assert_eq!(rel.reltype(), "http://example.com/rel");
        assert!(!rel.is_external());
        assert_eq!(rel.target_part(), Some(part(0)));
        assert_eq!(rel.target_url(), None);
    }

    #[test]
    fn test_next_r_id() {
        let mut rels = Relationships::new();
        assert_eq!(rels.next_r_id(), "rId1");

        rels.add_relationship("type1".to_string(), RelTarget::Part(part(0)), "rId1".to_string());
        assert_eq!(rels.next_r_id(), "rId2");
    }

    #[test]
    fn test_next_r_id_fills_gaps() {
        let mut rels = Relationships::new();
        for n in 1..=3 {
            rels.add_relationship("t".to_string(), RelTarget::Part(part(n)), format!("rId{}", n));
        }
        rels.remove("rId2");
        assert_eq!(rels.next_r_id(), "rId2");

        let rel = rels.get_or_add("t", part(9));
        assert_eq!(rel.r_id(), "rId2");
        assert_eq!(rels.next_r_id(), "rId4");
    }

    #[test]
    fn test_next_r_id_ignores_foreign_ids() {
        let mut rels = Relationships::new();
        rels.add_relationship("t".to_string(), RelTarget::Part(part(0)), "hdr".to_string());
        rels.add_relationship("t".to_string(), RelTarget::Part(part(1)), "rId1".to_string());
        assert_eq!(rels.next_r_id(), "rId2");
    }

    #[test]
    fn test_get_or_add() {
        let mut rels = Relationships::new();

        let rel1 = rels.get_or_add("type1", part(1));
        assert_eq!(rel1.r_id(), "rId1");

        // Getting the same relationship should return the same rId
        let rel2 = rels.get_or_add("type1", part(1));
        assert_eq!(rel2.r_id(), "rId1");
        assert_eq!(rels.len(), 1);

        // Different target should create new relationship
        let rel3 = rels.get_or_add("type1", part(2));
        assert_eq!(rel3.r_id(), "rId2");

        // Same target, different type is a separate edge
        let rel4 = rels.get_or_add("type2", part(1));
        assert_eq!(rel4.r_id(), "rId3");
        assert_eq!(rels.len(), 3);
    }

    #[test]
    fn test_get_or_add_ext_rel() {
        let mut rels = Relationships::new();
        let r_id = rels.get_or_add_ext_rel("hyperlink", "https://example.com");
        assert_eq!(r_id, "rId1");
        assert_eq!(rels.get_or_add_ext_rel("hyperlink", "https://example.com"), "rId1");
        assert_eq!(rels.get_or_add_ext_rel("hyperlink", "https://example.org"), "rId2");
        assert!(rels.get("rId1").unwrap().is_external());
        assert!(rels.related_parts().is_empty());
    }

    #[test]
    fn test_part_with_reltype() {
        let mut rels = Relationships::new();
        assert!(matches!(rels.part_with_reltype("styles"), Err(OpcError::NotFound(_))));

        rels.get_or_add("styles", part(4));
        assert_eq!(rels.part_with_reltype("styles").unwrap(), part(4));

        rels.get_or_add("styles", part(5));
        assert!(matches!(rels.part_with_reltype("styles"), Err(OpcError::Ambiguous(_))));
    }

    #[test]
    fn test_related_parts_tracks_add_and_remove() {
        let mut rels = Relationships::new();
        rels.get_or_add("t", part(7));
        rels.get_or_add_ext_rel("h", "https://example.com");
        assert_eq!(rels.related_parts().len(), 1);
        assert_eq!(rels.related_parts()["rId1"], part(7));

        rels.remove("rId1");
        assert!(rels.related_parts().is_empty());
    }

    #[test]
    fn test_to_xml() {
        let styles = PackURI::new("/word/styles.xml").unwrap();
        let mut rels = Relationships::new();
        for n in 1..=10 {
            rels.add_relationship(
                "http://example.com/styles".to_string(),
                RelTarget::Part(part(0)),
                format!("rId{}", n),
            );
        }
        rels.get_or_add_ext_rel("http://example.com/link", "https://example.com/?a=1&b=2");

        let xml = rels.to_xml("/word", |_| Some(&styles)).unwrap();

        assert!(xml.contains(r#"<Relationship Id="rId1" Type="http://example.com/styles" Target="styles.xml"/>"#));
        assert!(xml.contains(
            r#"<Relationship Id="rId11" Type="http://example.com/link" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>"#
        ));
        let pos2 = xml.find(r#"Id="rId2""#).unwrap();
        let pos10 = xml.find(r#"Id="rId10""#).unwrap();
        assert!(pos2 < pos10);
    }

    #[test]
    fn test_to_xml_dangling_target() {
        let mut rels = Relationships::new();
        rels.get_or_add("t", part(3));
        assert!(matches!(rels.to_xml("/", |_| None), Err(OpcError::Write(_))));
    }

    proptest! {
        #[test]
        fn prop_next_r_id_is_lowest_unused(used in proptest::collection::btree_set(1u32..40, 0..30)) {
            let mut rels = Relationships::new();
            for n in &used {
                rels.add_relationship("t".to_string(), RelTarget::Part(part(*n as usize)), format!("rId{}", n));
            }
            let expected = (1u32..).find(|n| !used.contains(n)).unwrap();
            prop_assert_eq!(rels.next_r_id(), format!("rId{}", expected));
        }
    }
}
