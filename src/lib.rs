//! Longan - Open Packaging Convention (OPC) packages for Rust
//!
//! This library reads and writes the ZIP-based container shared by the Office
//! Open XML formats (.docx, .xlsx, .pptx). A package is loaded into an
//! in-memory graph of parts connected by relationships, can be inspected and
//! edited, and is written back as a valid archive.
//!
//! # Features
//!
//! - **Graph loading**: Parts are discovered by walking relationships from the
//!   package root; each reachable part is read exactly once, cycles included
//! - **Pluggable part types**: A [`PartFactory`] chooses the concrete
//!   [`Part`] type for each content type
//! - **Faithful saving**: Content-type manifest, relationship items and part
//!   content are regenerated from the live graph
//! - **Core properties**: Title, author, revision and timestamps
//!
//! # Example - Reading a package
//!
//! ```no_run
//! use longan::Package;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pkg = Package::open("document.docx")?;
//!
//! for part in pkg.iter_parts() {
//!     println!("{} ({})", part.partname(), part.content_type());
//! }
//!
//! let main = pkg.main_document_part()?;
//! println!("Main part: {}", pkg.part(main).unwrap().partname());
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Editing and saving
//!
//! ```no_run
//! use longan::Package;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = Package::open("document.docx")?;
//! pkg.core_properties()?.set_title("Quarterly report");
//! pkg.save("document-edited.docx")?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod coreprops;
pub mod error;
pub mod package;
pub mod packuri;
pub mod part;
pub mod part_factory;
pub mod phys_pkg;
pub mod pkgreader;
pub mod pkgwriter;
pub mod rel;
pub mod xml;

pub use coreprops::CorePropertiesPart;
pub use error::{OpcError, Result};
pub use package::Package;
pub use packuri::PackURI;
pub use part::{BlobPart, Part, XmlPart};
pub use part_factory::{PartConstructor, PartFactory};
pub use pkgwriter::{Compression, SaveOptions};
pub use rel::{PartId, RelTarget, Relationship, Relationships};
