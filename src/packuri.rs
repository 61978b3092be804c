//! Provides the PackURI value type and utilities for working with package URIs.
//!
//! A PackURI represents a part name within an OPC package, following the URI format
//! defined by the Open Packaging Conventions specification.

use crate::error::{OpcError, Result};
use std::borrow::Cow;

/// Represents a package URI, which is a partname within an OPC package.
///
/// PackURIs always begin with a forward slash and use forward slashes as path separators,
/// following the OPC specification. They provide access to various components like
/// the base URI (directory), filename, extension, and index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackURI {
    /// The full pack URI string (e.g., "/word/document.xml")
    uri: String,
}

impl PackURI {
    /// Create a new PackURI from a string.
    ///
    /// # Errors
    ///
    /// Returns [`OpcError::InvalidName`] unless the string begins with a slash,
    /// has no trailing slash (other than the root `/` itself), no empty segment,
    /// and no query, fragment, backslash, or control characters.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self> {
        let uri = uri.into();
        Self::validate(&uri)?;
        Ok(PackURI { uri })
    }

    fn validate(uri: &str) -> Result<()> {
        if !uri.starts_with('/') {
            return Err(OpcError::InvalidName(format!(
                "PackURI must begin with slash, got '{}'",
                uri
            )));
        }
        if uri == "/" {
            return Ok(());
        }
        if uri.ends_with('/') {
            return Err(OpcError::InvalidName(format!(
                "PackURI must not end with slash, got '{}'",
                uri
            )));
        }
        if uri.contains("//") {
            return Err(OpcError::InvalidName(format!(
                "PackURI has an empty segment: '{}'",
                uri
            )));
        }
        if let Some(c) = uri
            .chars()
            .find(|c| matches!(c, '?' | '#' | '\\') || c.is_control())
        {
            return Err(OpcError::InvalidName(format!(
                "PackURI contains disallowed character {:?}: '{}'",
                c, uri
            )));
        }
        Ok(())
    }

    /// Create a PackURI from a relative reference and a base URI.
    ///
    /// This translates a relative reference (like "../styles.xml") onto a base URI
    /// (like "/word") to produce an absolute PackURI (like "/styles.xml").
    /// A reference that is already absolute is only normalized.
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self> {
        let joined = if relative_ref.starts_with('/') {
            relative_ref.to_string()
        } else {
            Self::join_paths(base_uri, relative_ref)
        };
        Self::new(Self::normalize_path(&joined))
    }

    /// Get the base URI (directory portion) of this PackURI.
    ///
    /// For example, "/ppt/slides" for "/ppt/slides/slide1.xml".
    /// For the package pseudo-partname "/", returns "/".
    pub fn base_uri(&self) -> &str {
        match self.uri.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.uri[..pos],
        }
    }

    /// Get the filename portion of this PackURI.
    ///
    /// For example, "slide1.xml" for "/ppt/slides/slide1.xml".
    /// For the package pseudo-partname "/", returns an empty string.
    pub fn filename(&self) -> &str {
        match self.uri.rfind('/') {
            Some(pos) => &self.uri[pos + 1..],
            None => "",
        }
    }

    /// Get the lowercased extension of this PackURI, without the leading period.
    ///
    /// For example, "xml" for "/word/document.XML", and "" for "/word/media".
    pub fn ext(&self) -> Cow<'_, str> {
        let filename = self.filename();
        let ext = match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        };
        if ext.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(ext.to_ascii_lowercase())
        } else {
            Cow::Borrowed(ext)
        }
    }

    /// Get the partname index for tuple partnames, or None for singleton partnames.
    ///
    /// The filename stem must be a run of ASCII letters followed by a number
    /// without leading zero. Returns 21 for "/ppt/slides/slide21.xml" and None
    /// for "/ppt/presentation.xml".
    pub fn idx(&self) -> Option<u32> {
        let filename = self.filename();
        let stem = match filename.rfind('.') {
            Some(pos) => &filename[..pos],
            None => filename,
        };

        let letters = stem.bytes().take_while(u8::is_ascii_alphabetic).count();
        if letters == 0 {
            return None;
        }
        let digits = &stem[letters..];
        let len = digits.bytes().take_while(u8::is_ascii_digit).count();
        if len == 0 || digits.starts_with('0') {
            return None;
        }
        digits[..len].parse::<u32>().ok()
    }

    /// Get the membername (URI with leading slash stripped).
    ///
    /// This is the form used as the Zip file membername for the package item.
    /// Returns an empty string for the package pseudo-partname "/".
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    /// Get the relative reference from a base URI to this PackURI.
    ///
    /// For example, PackURI("/ppt/slideLayouts/slideLayout1.xml") would return
    /// "../slideLayouts/slideLayout1.xml" for base_uri "/ppt/slides".
    pub fn relative_ref(&self, base_uri: &str) -> String {
        if base_uri == "/" {
            return self.membername().to_string();
        }

        let from_parts: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let to_parts: Vec<&str> = self.uri.split('/').filter(|s| !s.is_empty()).collect();

        // The filename never takes part in the common prefix.
        let common = from_parts
            .iter()
            .zip(to_parts[..to_parts.len().saturating_sub(1)].iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut result = String::with_capacity(self.uri.len());
        for _ in common..from_parts.len() {
            result.push_str("../");
        }
        for (i, part) in to_parts.iter().enumerate().skip(common) {
            if i > common {
                result.push('/');
            }
            result.push_str(part);
        }

        result
    }

    /// Get the PackURI of the .rels part corresponding to this PackURI.
    ///
    /// For example, "/word/_rels/document.xml.rels" for "/word/document.xml",
    /// and "/_rels/.rels" for the package pseudo-partname.
    pub fn rels_uri(&self) -> PackURI {
        let base_uri = self.base_uri();
        let uri = if base_uri == "/" {
            format!("/_rels/{}.rels", self.filename())
        } else {
            format!("{}/_rels/{}.rels", base_uri, self.filename())
        };
        // Derived from an already valid partname, so always valid.
        PackURI { uri }
    }

    /// The package pseudo-partname "/".
    pub fn package() -> PackURI {
        PackURI {
            uri: PACKAGE_URI.to_string(),
        }
    }

    /// Get the full URI string.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Helper function to join two paths using forward slashes
    fn join_paths(base: &str, rel: &str) -> String {
        if base.ends_with('/') {
            format!("{}{}", base, rel)
        } else {
            format!("{}/{}", base, rel)
        }
    }

    /// Helper function to normalize a path (resolve ".." and ".")
    fn normalize_path(path: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();

        for part in path.split('/') {
            match part {
                "" | "." => {},
                ".." => {
                    parts.pop();
                },
                _ => parts.push(part),
            }
        }

        let mut normalized = String::with_capacity(path.len());
        for part in parts {
            normalized.push('/');
            normalized.push_str(part);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }
        normalized
    }
}

impl std::fmt::Display for PackURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}

impl TryFrom<&str> for PackURI {
    type Error = OpcError;

    fn try_from(value: &str) -> Result<Self> {
        PackURI::new(value)
    }
}

/// The package pseudo-partname, representing the package itself
pub const PACKAGE_URI: &str = "/";

/// The URI for the [Content_Types].xml part
pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_packuri_new() {
        assert!(PackURI::new("/word/document.xml").is_ok());
        assert!(PackURI::new("/").is_ok());
        assert!(matches!(
            PackURI::new("word/document.xml"),
            Err(OpcError::InvalidName(_))
        ));
    }

    #[test]
    fn test_packuri_rejects_malformed() {
        for bad in [
            "/word/",
            "/word//document.xml",
            "/word/document.xml?x=1",
            "/word/document.xml#frag",
            "/word\\document.xml",
            "/word/doc\nument.xml",
            "",
        ] {
            assert!(
                matches!(PackURI::new(bad), Err(OpcError::InvalidName(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_base_uri() {
        let uri = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        assert_eq!(uri.base_uri(), "/ppt/slides");

        let top = PackURI::new("/document.xml").unwrap();
        assert_eq!(top.base_uri(), "/");

        let root = PackURI::new("/").unwrap();
        assert_eq!(root.base_uri(), "/");
    }

    #[test]
    fn test_filename() {
        let uri = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        assert_eq!(uri.filename(), "slide1.xml");

        let root = PackURI::new("/").unwrap();
        assert_eq!(root.filename(), "");
    }

    #[test]
    fn test_ext() {
        let uri = PackURI::new("/word/document.xml").unwrap();
        assert_eq!(uri.ext(), "xml");

        let upper = PackURI::new("/foo/bar.XML").unwrap();
        assert_eq!(upper.ext(), "xml");

        let none = PackURI::new("/word/media").unwrap();
        assert_eq!(none.ext(), "");
    }

    #[test]
    fn test_idx() {
        let uri = PackURI::new("/ppt/slides/slide21.xml").unwrap();
        assert_eq!(uri.idx(), Some(21));

        let uri = PackURI::new("/ppt/presentation.xml").unwrap();
        assert_eq!(uri.idx(), None);

        let uri = PackURI::new("/word/header07.xml").unwrap();
        assert_eq!(uri.idx(), None);

        let uri = PackURI::new("/word/2header.xml").unwrap();
        assert_eq!(uri.idx(), None);
    }

    #[test]
    fn test_membername() {
        let uri = PackURI::new("/word/document.xml").unwrap();
        assert_eq!(uri.membername(), "word/document.xml");

        let root = PackURI::new("/").unwrap();
        assert_eq!(root.membername(), "");
    }

    #[test]
    fn test_relative_ref() {
        let uri = PackURI::new("/ppt/slideLayouts/slideLayout1.xml").unwrap();
        assert_eq!(uri.relative_ref("/ppt/slides"), "../slideLayouts/slideLayout1.xml");

        let uri = PackURI::new("/word/styles.xml").unwrap();
        assert_eq!(uri.relative_ref("/word"), "styles.xml");
        assert_eq!(uri.relative_ref("/"), "word/styles.xml");

        let uri = PackURI::new("/docProps/core.xml").unwrap();
        assert_eq!(uri.relative_ref("/word/glossary"), "../../docProps/core.xml");
    }

    #[test]
    fn test_relative_ref_into_same_named_dir() {
        // Target directory shares the name of the base directory's last segment.
        let uri = PackURI::new("/word/media/media").unwrap();
        assert_eq!(uri.relative_ref("/word/media"), "media");
    }

    #[test]
    fn test_from_rel_ref() {
        let uri = PackURI::from_rel_ref("/ppt/slides", "../slideLayouts/slideLayout1.xml").unwrap();
        assert_eq!(uri.as_str(), "/ppt/slideLayouts/slideLayout1.xml");

        let uri = PackURI::from_rel_ref("/", "word/document.xml").unwrap();
        assert_eq!(uri.as_str(), "/word/document.xml");

        let uri = PackURI::from_rel_ref("/word", "./media/./image1.png").unwrap();
        assert_eq!(uri.as_str(), "/word/media/image1.png");

        let uri = PackURI::from_rel_ref("/word", "/customXml/item1.xml").unwrap();
        assert_eq!(uri.as_str(), "/customXml/item1.xml");
    }

    #[test]
    fn test_rels_uri() {
        let uri = PackURI::new("/word/document.xml").unwrap();
        assert_eq!(uri.rels_uri().as_str(), "/word/_rels/document.xml.rels");

        assert_eq!(PackURI::package().rels_uri().as_str(), "/_rels/.rels");
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9]{0,7}"
    }

    proptest! {
        #[test]
        fn prop_relative_ref_resolves_back(
            base in proptest::collection::vec(segment(), 0..4),
            target in proptest::collection::vec(segment(), 0..4),
            name in segment(),
        ) {
            let base_uri = if base.is_empty() { "/".to_string() } else { format!("/{}", base.join("/")) };
            let mut target_path = String::new();
            for dir in &target {
                target_path.push('/');
                target_path.push_str(dir);
            }
            target_path.push('/');
            target_path.push_str(&name);
            target_path.push_str(".xml");

            let uri = PackURI::new(target_path).unwrap();
            let rel = uri.relative_ref(&base_uri);
            let back = PackURI::from_rel_ref(&base_uri, &rel).unwrap();
            prop_assert_eq!(back, uri);
        }
    }
}
