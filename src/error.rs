/// Error types for OPC package operations
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    /// Malformed partname, or a partname where a different kind was required
    #[error("Invalid partname: {0}")]
    InvalidName(String),

    /// Relationship, part, or manifest entry not present
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one relationship matched where exactly one was expected
    #[error("Ambiguous: {0}")]
    Ambiguous(String),

    /// The archive cannot be opened or is structurally inconsistent
    #[error("Package load error: {0}")]
    Load(String),

    /// The package cannot be serialized or the destination cannot be written
    #[error("Package write error: {0}")]
    Write(String),

    #[error("XML parsing error: {0}")]
    Xml(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl From<quick_xml::Error> for OpcError {
    fn from(err: quick_xml::Error) -> Self {
        OpcError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OpcError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OpcError::Xml(format!("attribute error: {}", err))
    }
}

impl OpcError {
    /// Whether the caller can reasonably recover, e.g. by creating a default part.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OpcError::NotFound(_) | OpcError::Ambiguous(_))
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;
