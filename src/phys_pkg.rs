//! Provides a general interface to a physical OPC package (ZIP file).
//!
//! The reader decompresses every member up front into a name-indexed cache, so
//! the relationship walk that follows never touches the archive again. The
//! writer assembles the archive in memory; nothing reaches the destination
//! until the whole package has been serialized.

use crate::error::{OpcError, Result};
use crate::packuri::{CONTENT_TYPES_URI, PackURI};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::trace;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Upper bound on the buffer reserved from a member's declared size.
const SIZE_HINT_CAP: u64 = 1 << 20;

/// Physical package reader holding the decompressed members of a ZIP-based
/// OPC package.
#[derive(Debug)]
pub struct PhysPkgReader {
    /// Member name (no leading slash) -> decompressed bytes
    members: HashMap<String, Vec<u8>>,
}

impl PhysPkgReader {
    /// Open an OPC package from a file path.
    ///
    /// # Errors
    ///
    /// [`OpcError::Load`] if the file does not exist, cannot be opened, or is
    /// not a readable ZIP archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(OpcError::Load(format!(
                "package not found: {}",
                path.display()
            )));
        }

        let file = std::fs::File::open(path)
            .map_err(|e| OpcError::Load(format!("cannot open {}: {}", path.display(), e)))?;
        Self::new(std::io::BufReader::new(file))
    }

    /// Create a reader from any seekable source of ZIP data.
    pub fn new<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| OpcError::Load(format!("not a ZIP archive: {}", e)))?;

        let mut members = HashMap::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| OpcError::Load(format!("unreadable ZIP entry #{}: {}", index, e)))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            // The declared size is untrusted
            let mut blob = Vec::with_capacity(entry.size().min(SIZE_HINT_CAP) as usize);
            entry
                .read_to_end(&mut blob)
                .map_err(|e| OpcError::Load(format!("cannot decompress '{}': {}", name, e)))?;
            trace!(member = %name, size = blob.len(), "read zip member");
            members.insert(name, blob);
        }

        Ok(Self { members })
    }

    /// Create a reader from ZIP data held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::new(Cursor::new(data))
    }

    /// Get the binary content for a part by its PackURI.
    pub fn blob_for(&self, pack_uri: &PackURI) -> Option<&[u8]> {
        self.members
            .get(pack_uri.membername())
            .map(Vec::as_slice)
    }

    /// Take ownership of a member's content, removing it from the cache.
    pub fn take_blob(&mut self, pack_uri: &PackURI) -> Option<Vec<u8>> {
        self.members.remove(pack_uri.membername())
    }

    /// Get the [Content_Types].xml content.
    ///
    /// This is a required part of every OPC package.
    pub fn content_types_xml(&self) -> Result<&[u8]> {
        self.members
            .get(CONTENT_TYPES_URI.trim_start_matches('/'))
            .map(Vec::as_slice)
            .ok_or_else(|| OpcError::Load("package has no [Content_Types].xml".to_string()))
    }

    /// Get the relationships XML for a source URI, or None if the source has no
    /// relationships item.
    pub fn rels_xml_for(&self, source_uri: &PackURI) -> Option<&[u8]> {
        self.blob_for(&source_uri.rels_uri())
    }

    /// Check if a specific member exists in the package.
    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        self.members.contains_key(pack_uri.membername())
    }

    /// Number of file members in the package.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the package has no file members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All member names, sorted.
    pub fn member_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Physical package writer for creating OPC packages in memory.
pub struct PhysPkgWriter {
    /// The underlying ZIP archive writer
    archive: ZipWriter<Cursor<Vec<u8>>>,
}

impl PhysPkgWriter {
    /// Create a new package writer that writes to memory.
    pub fn new() -> Self {
        Self {
            archive: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Write a part to the package with Deflate compression.
    pub fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        self.write_with(pack_uri, blob, CompressionMethod::Deflated)
    }

    /// Write a part to the package without compression (stored).
    pub fn write_stored(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        self.write_with(pack_uri, blob, CompressionMethod::Stored)
    }

    fn write_with(
        &mut self,
        pack_uri: &PackURI,
        blob: &[u8],
        method: CompressionMethod,
    ) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(method);
        self.archive
            .start_file(pack_uri.membername(), options)
            .map_err(|e| OpcError::Write(format!("cannot add '{}': {}", pack_uri, e)))?;
        self.archive
            .write_all(blob)
            .map_err(|e| OpcError::Write(format!("cannot write '{}': {}", pack_uri, e)))?;
        trace!(member = %pack_uri, size = blob.len(), "wrote zip member");
        Ok(())
    }

    /// Finish writing and return the package bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .archive
            .finish()
            .map_err(|e| OpcError::Write(format!("cannot finish archive: {}", e)))?;
        Ok(cursor.into_inner())
    }
}

impl Default for PhysPkgWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut writer = PhysPkgWriter::new();
        let pack_uri = PackURI::new("/test.txt").unwrap();
        writer.write(&pack_uri, b"Hello, World!").unwrap();
        let zip_data = writer.finish().unwrap();

        let reader = PhysPkgReader::from_bytes(&zip_data).unwrap();
        assert_eq!(reader.blob_for(&pack_uri).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_multiple_parts() {
        let mut writer = PhysPkgWriter::new();

        let content_types = PackURI::new(CONTENT_TYPES_URI).unwrap();
        let rels = PackURI::package().rels_uri();
        let document = PackURI::new("/word/document.xml").unwrap();

        writer.write(&content_types, b"<Types/>").unwrap();
        writer.write(&rels, b"<Relationships/>").unwrap();
        writer.write_stored(&document, b"<document/>").unwrap();

        let zip_data = writer.finish().unwrap();
        let mut reader = PhysPkgReader::from_bytes(&zip_data).unwrap();

        assert_eq!(reader.len(), 3);
        assert!(reader.contains(&content_types));
        assert_eq!(reader.content_types_xml().unwrap(), b"<Types/>");
        assert_eq!(reader.rels_xml_for(&PackURI::package()).unwrap(), b"<Relationships/>");
        assert_eq!(reader.rels_xml_for(&document), None);
        assert_eq!(
            reader.member_names(),
            vec!["[Content_Types].xml", "_rels/.rels", "word/document.xml"]
        );
        assert_eq!(reader.take_blob(&document).unwrap(), b"<document/>");
        assert!(!reader.contains(&document));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            PhysPkgReader::from_bytes(b"definitely not a zip"),
            Err(OpcError::Load(_))
        ));
    }

    #[test]
    fn test_missing_content_types() {
        let mut writer = PhysPkgWriter::new();
        writer
            .write(&PackURI::new("/word/document.xml").unwrap(), b"<document/>")
            .unwrap();
        let reader = PhysPkgReader::from_bytes(&writer.finish().unwrap()).unwrap();
        assert!(matches!(reader.content_types_xml(), Err(OpcError::Load(_))));
    }

    /// Rewrite the uncompressed size recorded in the first central directory
    /// header, in its zip64 extra field when there is one.
    fn forge_declared_size(zip: &mut [u8]) {
        let cd = memchr::memmem::find(zip, b"PK\x01\x02").unwrap();
        let u16_at = |zip: &[u8], at: usize| u16::from_le_bytes([zip[at], zip[at + 1]]) as usize;
        let name_len = u16_at(zip, cd + 28);
        let extra_len = u16_at(zip, cd + 30);
        let mut at = cd + 46 + name_len;
        let end = at + extra_len;
        while at + 4 <= end {
            let (id, len) = (u16_at(zip, at), u16_at(zip, at + 2));
            if id == 0x0001 && len >= 8 {
                zip[at + 4..at + 12].copy_from_slice(&(1u64 << 62).to_le_bytes());
                return;
            }
            at += 4 + len;
        }
        zip[cd + 24..cd + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
    }

    #[test]
    fn test_oversized_declared_size_does_not_preallocate() {
        let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        archive.start_file("word/document.xml", options).unwrap();
        archive.write_all(b"<document/>").unwrap();
        let mut zip = archive.finish().unwrap().into_inner();
        forge_declared_size(&mut zip);

        match PhysPkgReader::from_bytes(&zip) {
            Ok(reader) => {
                let uri = PackURI::new("/word/document.xml").unwrap();
                assert_eq!(reader.blob_for(&uri).unwrap(), b"<document/>");
            },
            Err(err) => assert!(matches!(err, OpcError::Load(_)), "{err}"),
        }
    }

    #[test]
    fn test_open_directory_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PhysPkgReader::open(dir.path()).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)), "{err}");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PhysPkgReader::open(dir.path().join("missing.docx")).unwrap_err();
        assert!(matches!(err, OpcError::Load(_)));
    }
}
