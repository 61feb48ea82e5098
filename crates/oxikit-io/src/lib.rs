//! `OxiKit` data sources.
//!
//! This crate provides the byte-level persistence layer of the `OxiKit`
//! runtime:
//!
//! - [`DataSource`]: a seekable byte stream with a declared [`ByteOrder`]
//! - [`DataSourceExt`]: typed primitives, debug type tags, absolute-offset
//!   patching and string encoding for every source
//! - Backings: [`FileSource`], [`MemorySource`], [`CoreSource`],
//!   [`ConstSource`]
//! - [`version`]: archive version records with a hard major check and a
//!   soft minor check
//!
//! # Example
//!
//! ```rust
//! use oxikit_io::{ArchiveVersion, DataSourceExt, MemorySource};
//! use oxikit_io::version::{read_version, write_version};
//!
//! let mut ds = MemorySource::new();
//! write_version(&mut ds, "palette", ArchiveVersion::new(1, 4)).unwrap();
//! ds.write_f32(0.5).unwrap();
//!
//! ds.rewind().unwrap();
//! let found = read_version(&mut ds, "palette", ArchiveVersion::new(1, 0)).unwrap();
//! assert_eq!(found.minor, 4);
//! assert_eq!(ds.read_f32().unwrap(), 0.5);
//! ```

pub mod byte_order;
pub mod error;
pub mod file;
pub mod memory;
pub mod primitive;
pub mod source;
pub mod version;

pub use byte_order::ByteOrder;
pub use error::{Error, Result};
pub use file::{FILE_BUFFER, FileSource};
pub use memory::{ConstSource, CoreSource, MEMORY_MAX, MemorySource};
pub use primitive::{Primitive, TypeTag};
pub use source::{DataSource, DataSourceExt, STRING_MAX, StreamSettings};
pub use version::{ArchiveVersion, Compat};
