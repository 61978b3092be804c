//! Objects that implement reading and writing OPC packages.
//!
//! This module provides the main [`Package`] type, which represents an Open
//! Packaging Convention package in memory. The package owns every part in an
//! arena; relationships refer to parts by [`PartId`].

use crate::constants::relationship_type as rt;
use crate::coreprops::CorePropertiesPart;
use crate::error::{OpcError, Result};
use crate::packuri::PackURI;
use crate::part::{BlobPart, Part};
use crate::part_factory::PartFactory;
use crate::phys_pkg::PhysPkgReader;
use crate::pkgreader::{PackageReader, SerializedPart, SerializedRelationship};
use crate::pkgwriter::{PackageWriter, SaveOptions};
use crate::rel::{PartId, RelTarget, Relationship, Relationships};
use fixedbitset::FixedBitSet;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::debug;

/// Main API class for working with OPC packages.
///
/// Only parts reachable from the package relationships take part in
/// iteration and saving; a part added with [`Package::add_part`] stays
/// invisible until something relates to it.
#[derive(Debug, Default)]
pub struct Package {
    /// Package-level relationships
    rels: Relationships,

    /// Part arena, indexed by [`PartId`]
    parts: Vec<Box<dyn Part>>,

    /// SHA-256 of media content -> part holding it
    media: HashMap<Vec<u8>, PartId>,
}

impl Package {
    /// Create a new empty OPC package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an OPC package from a file, using [`PartFactory::default`].
    ///
    /// # Example
    /// ```no_run
    /// use longan::Package;
    ///
    /// let pkg = Package::open("document.docx")?;
    /// let main = pkg.main_document_part()?;
    /// println!("{}", pkg.part(main).unwrap().content_type());
    /// # Ok::<(), longan::OpcError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &PartFactory::default())
    }

    /// Open an OPC package from a file with a caller-supplied part factory.
    pub fn open_with<P: AsRef<Path>>(path: P, factory: &PartFactory) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening package");
        Self::from_phys_reader(PhysPkgReader::open(path)?, factory)
    }

    /// Load an OPC package from a reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::from_reader_with(reader, &PartFactory::default())
    }

    /// Load an OPC package from a reader with a caller-supplied part factory.
    pub fn from_reader_with<R: Read + Seek>(reader: R, factory: &PartFactory) -> Result<Self> {
        Self::from_phys_reader(PhysPkgReader::new(reader)?, factory)
    }

    /// Load an OPC package from bytes held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(data))
    }

    fn from_phys_reader(phys_reader: PhysPkgReader, factory: &PartFactory) -> Result<Self> {
        let pkg_reader = PackageReader::from_phys_reader(phys_reader)?;
        Self::unmarshal(pkg_reader, factory)
    }

    /// Build the in-memory graph from discovered parts.
    ///
    /// Every part is constructed before any relationship is attached, so
    /// relationship targets always resolve to a live [`PartId`].
    pub fn unmarshal(pkg_reader: PackageReader, factory: &PartFactory) -> Result<Self> {
        let (pkg_srels, sparts) = pkg_reader.into_parts();
        let mut package = Self::new();
        package.parts.reserve(sparts.len());

        let mut ids: HashMap<PackURI, PartId> = HashMap::with_capacity(sparts.len());
        let mut part_srels = Vec::with_capacity(sparts.len());

        for spart in sparts {
            let SerializedPart {
                partname,
                content_type,
                reltype,
                blob,
                srels,
            } = spart;
            let part = factory.load(partname.clone(), content_type, &reltype, blob)?;
            let id = package.add_part(part);
            ids.insert(partname, id);
            part_srels.push((id, srels));
        }

        for srel in &pkg_srels {
            let target = Self::resolve_target(srel, &ids)?;
            package
                .rels
                .add_relationship(srel.reltype.clone(), target, srel.r_id.clone());
        }

        for (id, srels) in &part_srels {
            for srel in srels {
                let target = Self::resolve_target(srel, &ids)?;
                package.parts[id.0].load_rel(&srel.reltype, target, &srel.r_id);
            }
        }

        for part in &mut package.parts {
            part.after_unmarshal()?;
        }
        package.after_unmarshal();

        debug!(parts = package.parts.len(), "package loaded");
        Ok(package)
    }

    fn resolve_target(
        srel: &SerializedRelationship,
        ids: &HashMap<PackURI, PartId>,
    ) -> Result<RelTarget> {
        if srel.is_external() {
            return Ok(RelTarget::External(srel.target_ref.clone()));
        }
        let partname = srel
            .target_partname()
            .map_err(|e| OpcError::Load(e.to_string()))?;
        ids.get(&partname)
            .copied()
            .map(RelTarget::Part)
            .ok_or_else(|| {
                OpcError::Load(format!(
                    "relationship '{}' targets unknown part '{}'",
                    srel.r_id, partname
                ))
            })
    }

    /// Index the reachable media parts by content digest.
    fn after_unmarshal(&mut self) {
        let media: Vec<(Vec<u8>, PartId)> = self
            .iter_part_ids()
            .filter_map(|id| {
                let part = self.part(id)?;
                part.content_type()
                    .starts_with("image/")
                    .then(|| (sha256(&part.blob()), id))
            })
            .collect();
        for (digest, id) in media {
            self.media.entry(digest).or_insert(id);
        }
    }

    /// Add a part to the arena and return its handle.
    ///
    /// The part is not reachable until a relationship targets it.
    pub fn add_part(&mut self, part: Box<dyn Part>) -> PartId {
        let id = PartId(self.parts.len());
        self.parts.push(part);
        id
    }

    /// Get a part by handle.
    pub fn part(&self, id: PartId) -> Option<&dyn Part> {
        self.parts.get(id.0).map(|b| &**b as &dyn Part)
    }

    /// Get a mutable part by handle.
    pub fn part_mut(&mut self, id: PartId) -> Option<&mut dyn Part> {
        match self.parts.get_mut(id.0) {
            Some(b) => Some(&mut **b as &mut dyn Part),
            None => None,
        }
    }

    /// Get a part as its concrete type.
    pub fn part_as<T: Part>(&self, id: PartId) -> Option<&T> {
        self.part(id)?.as_any().downcast_ref::<T>()
    }

    /// Get a part mutably as its concrete type.
    pub fn part_as_mut<T: Part>(&mut self, id: PartId) -> Option<&mut T> {
        self.part_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Find a reachable part by partname.
    pub fn part_by_partname(&self, partname: &PackURI) -> Result<PartId> {
        self.iter_part_ids()
            .find(|id| {
                self.part(*id)
                    .is_some_and(|part| part.partname() == partname)
            })
            .ok_or_else(|| OpcError::NotFound(format!("no part named '{}'", partname)))
    }

    /// Handles of every reachable part, depth-first in relationship order.
    ///
    /// Each call walks the graph afresh, so relationship changes made between
    /// calls are reflected. Each part is yielded once, cycles included.
    pub fn iter_part_ids(&self) -> PartIds<'_> {
        PartIds::new(self)
    }

    /// Every reachable part, in the order of [`Package::iter_part_ids`].
    pub fn iter_parts(&self) -> impl Iterator<Item = &dyn Part> {
        self.iter_part_ids().filter_map(|id| self.part(id))
    }

    /// Every relationship reachable from the package, paired with its source
    /// (`None` for the package itself).
    pub fn iter_rels(&self) -> Rels<'_> {
        Rels::new(self)
    }

    /// Get a reference to the package-level relationships.
    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    /// Get a mutable reference to the package-level relationships.
    pub fn rels_mut(&mut self) -> &mut Relationships {
        &mut self.rels
    }

    /// Relate the package to a part, returning the rId.
    ///
    /// Reuses an existing relationship of the same type to the same part.
    pub fn relate_to(&mut self, target: PartId, reltype: &str) -> String {
        self.rels.get_or_add(reltype, target).r_id().to_string()
    }

    /// Relate the package to an external URL, returning the rId.
    pub fn relate_to_ext(&mut self, target_url: &str, reltype: &str) -> String {
        self.rels.get_or_add_ext_rel(reltype, target_url)
    }

    /// Target of the single package relationship of a type.
    pub fn part_related_by(&self, reltype: &str) -> Result<PartId> {
        self.rels.part_with_reltype(reltype)
    }

    /// rId -> part for the package's internal relationships.
    pub fn related_parts(&self) -> &HashMap<String, PartId> {
        self.rels.related_parts()
    }

    /// Remove a package-level relationship; returns whether one was removed.
    pub fn drop_rel(&mut self, r_id: &str) -> bool {
        self.rels.remove(r_id).is_some()
    }

    /// The main document part (document, workbook or presentation).
    pub fn main_document_part(&self) -> Result<PartId> {
        self.part_related_by(rt::OFFICE_DOCUMENT)
    }

    /// Printable target of a part's relationship.
    ///
    /// External targets are returned verbatim; internal targets as the
    /// partname relative to the source part's directory.
    pub fn target_ref(&self, source: PartId, r_id: &str) -> Result<String> {
        let source = self
            .part(source)
            .ok_or_else(|| OpcError::NotFound(format!("no part with id {}", source.index())))?;
        let rel = source.rels().get(r_id).ok_or_else(|| {
            OpcError::NotFound(format!("no relationship '{}' on '{}'", r_id, source.partname()))
        })?;
        match rel.target() {
            RelTarget::External(url) => Ok(url.clone()),
            RelTarget::Part(id) => {
                let target = self.part(*id).ok_or_else(|| {
                    OpcError::NotFound(format!("relationship '{}' targets a missing part", r_id))
                })?;
                Ok(target.partname().relative_ref(source.partname().base_uri()))
            },
        }
    }

    /// First partname produced by `template` that no part uses.
    ///
    /// `template` contains `%d`, replaced by 1, 2, ... in turn.
    ///
    /// # Example
    /// ```
    /// # let pkg = longan::Package::new();
    /// let name = pkg.next_partname("/word/media/image%d.png")?;
    /// assert_eq!(name.as_str(), "/word/media/image1.png");
    /// # Ok::<(), longan::OpcError>(())
    /// ```
    pub fn next_partname(&self, template: &str) -> Result<PackURI> {
        if !template.contains("%d") {
            return Err(OpcError::InvalidName(format!(
                "partname template '{}' has no %d placeholder",
                template
            )));
        }

        let taken: HashSet<&str> = self
            .parts
            .iter()
            .map(|part| part.partname().as_str())
            .collect();
        let candidate = (1..=taken.len() + 1)
            .map(|n| template.replace("%d", itoa::Buffer::new().format(n)))
            .find(|candidate| !taken.contains(candidate.as_str()))
            // One of len + 1 candidates is always free.
            .unwrap_or_else(|| template.replace("%d", itoa::Buffer::new().format(taken.len() + 1)));
        PackURI::new(candidate)
    }

    /// The core properties part, created with defaults when the package has
    /// none.
    pub fn core_properties(&mut self) -> Result<&mut CorePropertiesPart> {
        let id = match self.part_related_by(rt::CORE_PROPERTIES) {
            Ok(id) => id,
            Err(OpcError::NotFound(_)) => {
                let id = self.add_part(Box::new(CorePropertiesPart::new_default()?));
                self.relate_to(id, rt::CORE_PROPERTIES);
                debug!("created default core properties part");
                id
            },
            Err(e) => return Err(e),
        };
        self.part_as_mut::<CorePropertiesPart>(id).ok_or_else(|| {
            OpcError::NotFound("core properties part was not loaded as CorePropertiesPart".into())
        })
    }

    /// A media part holding exactly `blob`, reusing an identical one when the
    /// package already has it.
    ///
    /// New parts are named from `template` (see [`Package::next_partname`]);
    /// the caller relates the returned part where it is used.
    pub fn get_or_add_media_part(
        &mut self,
        template: &str,
        content_type: &str,
        blob: Vec<u8>,
    ) -> Result<PartId> {
        let digest = sha256(&blob);
        if let Some(&id) = self.media.get(&digest) {
            // The part may have been edited since it was indexed.
            if self.part(id).is_some_and(|part| sha256(&part.blob()) == digest) {
                return Ok(id);
            }
        }

        let partname = self.next_partname(template)?;
        debug!(partname = %partname, "adding media part");
        let id = self.add_part(Box::new(BlobPart::new(
            partname,
            content_type.to_string(),
            blob,
        )));
        self.media.insert(digest, id);
        Ok(id)
    }

    /// Save the package to a file with default options.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Save the package to a file.
    ///
    /// The archive is built in memory first; the destination is only
    /// touched once serialization has succeeded.
    pub fn save_with<P: AsRef<Path>>(&mut self, path: P, options: &SaveOptions) -> Result<()> {
        self.before_marshal()?;
        PackageWriter::write(path, self, options)
    }

    /// Save the package to a writer.
    pub fn save_to_writer<W: Write>(&mut self, writer: W, options: &SaveOptions) -> Result<()> {
        self.before_marshal()?;
        PackageWriter::write_to_stream(writer, self, options)
    }

    /// Serialize the package to bytes.
    pub fn to_bytes(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        self.before_marshal()?;
        PackageWriter::to_bytes(self, options)
    }

    fn before_marshal(&mut self) -> Result<()> {
        let ids: Vec<PartId> = self.iter_part_ids().collect();
        for id in ids {
            self.parts[id.0].before_marshal()?;
        }
        Ok(())
    }
}

fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Depth-first iterator over reachable part handles.
///
/// Created by [`Package::iter_part_ids`].
pub struct PartIds<'a> {
    package: &'a Package,
    stack: Vec<PartId>,
    visited: FixedBitSet,
}

impl<'a> PartIds<'a> {
    fn new(package: &'a Package) -> Self {
        let mut iter = Self {
            package,
            stack: Vec::with_capacity(16),
            visited: FixedBitSet::with_capacity(package.parts.len()),
        };
        iter.push_targets(&package.rels);
        iter
    }

    /// Queue targets so the lowest rId is visited first.
    fn push_targets(&mut self, rels: &'a Relationships) {
        let start = self.stack.len();
        self.stack
            .extend(rels.iter().filter_map(Relationship::target_part));
        self.stack[start..].reverse();
    }
}

impl Iterator for PartIds<'_> {
    type Item = PartId;

    fn next(&mut self) -> Option<PartId> {
        while let Some(id) = self.stack.pop() {
            if id.0 >= self.package.parts.len() || self.visited.put(id.0) {
                continue;
            }
            let package = self.package;
            self.push_targets(package.parts[id.0].rels());
            return Some(id);
        }
        None
    }
}

/// Depth-first iterator over reachable relationships.
///
/// Created by [`Package::iter_rels`]. A part's relationships are walked
/// right after the relationship that first reaches it.
pub struct Rels<'a> {
    package: &'a Package,
    stack: Vec<(Option<PartId>, std::vec::IntoIter<&'a Relationship>)>,
    visited: FixedBitSet,
}

impl<'a> Rels<'a> {
    fn new(package: &'a Package) -> Self {
        let root: Vec<&'a Relationship> = package.rels.iter().collect();
        Self {
            package,
            stack: vec![(None, root.into_iter())],
            visited: FixedBitSet::with_capacity(package.parts.len()),
        }
    }
}

impl<'a> Iterator for Rels<'a> {
    type Item = (Option<PartId>, &'a Relationship);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let source = frame.0;
            let Some(rel) = frame.1.next() else {
                self.stack.pop();
                continue;
            };

            if let Some(target) = rel.target_part() {
                let package = self.package;
                if target.0 < package.parts.len() && !self.visited.put(target.0) {
                    let rels: Vec<&'a Relationship> = package.parts[target.0].rels().iter().collect();
                    self.stack.push((Some(target), rels.into_iter()));
                }
            }
            return Some((source, rel));
        }
    }
}
