//! Module image container format.
//!
//! This module defines the on-disk/in-memory container that the engine treats as a
//! loadable binary image: a magic-tagged header, the module name, its declared
//! dependencies, the exported type records and an opaque payload. The format is the
//! engine's validity predicate - anything [`ModuleImage::parse`] rejects is not a
//! loadable image.
//!
//! # Layout
//!
//! All integers are little-endian, all strings `u16` length-prefixed UTF-8:
//!
//! ```text
//! u32  magic     = "MODL"
//! u16  version   = 1
//! u16  reserved  = 0
//! str  module name
//! u16  dependency count, then one str per dependency
//! u16  type count, then per type:
//!      str  name
//!      u8   flags (EXPORTED | DEFAULT_CTOR | CTOR_FAULT)
//!      u16  field count, then one str per field
//! u32  payload length, then payload bytes (opaque module body)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use dynload::image::format::{ImageBuilder, ModuleImage, TypeFlags, TypeRecord};
//!
//! let bytes = ImageBuilder::new("widgets")
//!     .with_dependency("geometry")
//!     .with_type(TypeRecord::new(
//!         "Widget",
//!         TypeFlags::EXPORTED | TypeFlags::DEFAULT_CTOR,
//!         vec!["width".into(), "height".into()],
//!     ))
//!     .build();
//!
//! let image = ModuleImage::parse(&bytes)?;
//! assert_eq!(image.name, "widgets");
//! assert_eq!(image.dependencies, vec!["geometry"]);
//! # Ok::<(), dynload::Error>(())
//! ```

use bitflags::bitflags;

use crate::{image::parser::Parser, Result};

/// Magic tag at the start of every module image: `"MODL"` read as a little-endian `u32`.
pub const MAGIC: u32 = u32::from_le_bytes(*b"MODL");

/// The container format version this engine reads and writes.
pub const FORMAT_VERSION: u16 = 1;

bitflags! {
    /// Per-type-record flags in a module image.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u8 {
        /// The type is part of the module's exported surface.
        const EXPORTED = 0x01;
        /// The type exposes a zero-argument constructor.
        const DEFAULT_CTOR = 0x02;
        /// The type's constructor faults when invoked. Used to model failing
        /// initializers; only meaningful together with `DEFAULT_CTOR`.
        const CTOR_FAULT = 0x04;
    }
}

/// One type record inside a module image.
///
/// Records are stored in declaration order; the order is preserved through
/// introspection so exported type enumeration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    /// Type name, unique within the module
    pub name: String,
    /// Export and constructor flags
    pub flags: TypeFlags,
    /// Field names, in declaration order
    pub fields: Vec<String>,
}

impl TypeRecord {
    /// Create a new type record.
    #[must_use]
    pub fn new(name: impl Into<String>, flags: TypeFlags, fields: Vec<String>) -> Self {
        TypeRecord {
            name: name.into(),
            flags,
            fields,
        }
    }
}

/// A fully decoded module image.
///
/// This is the result of running the validity predicate over raw bytes. A
/// `ModuleImage` is immutable and owned by the [`crate::Module`] that was loaded
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    /// Module name carried by the image; may be empty for anonymous images that
    /// are loaded with an identifier hint
    pub name: String,
    /// Names of modules this image depends on, in declaration order
    pub dependencies: Vec<String>,
    /// Type records, in declaration order
    pub types: Vec<TypeRecord>,
    /// Opaque module body
    pub payload: Vec<u8>,
}

impl ModuleImage {
    /// Decode and validate a module image from raw bytes.
    ///
    /// This is the format's validity predicate: well-formed bytes yield a decoded
    /// image, anything else is rejected.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input and [`crate::Error::Malformed`]
    /// for a wrong magic, an unsupported version, truncated data, invalid UTF-8,
    /// duplicate dependency or type names, or trailing bytes after the payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }

        let mut parser = Parser::new(data);

        let magic = parser.read_u32()?;
        if magic != MAGIC {
            return Err(malformed_error!(
                "invalid magic 0x{:08X}, expected 0x{:08X}",
                magic,
                MAGIC
            ));
        }

        let version = parser.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(malformed_error!(
                "unsupported format version {}, expected {}",
                version,
                FORMAT_VERSION
            ));
        }

        let reserved = parser.read_u16()?;
        if reserved != 0 {
            return Err(malformed_error!("reserved field must be zero, was {}", reserved));
        }

        let name = parser.read_str()?;

        let dependency_count = parser.read_u16()?;
        let mut dependencies = Vec::with_capacity(dependency_count as usize);
        for _ in 0..dependency_count {
            let dependency = parser.read_str()?;
            if dependency.is_empty() {
                return Err(malformed_error!("dependency name must not be empty"));
            }
            if dependencies.contains(&dependency) {
                return Err(malformed_error!("duplicate dependency '{}'", dependency));
            }
            dependencies.push(dependency);
        }

        let type_count = parser.read_u16()?;
        let mut types: Vec<TypeRecord> = Vec::with_capacity(type_count as usize);
        for _ in 0..type_count {
            let type_name = parser.read_str()?;
            if type_name.is_empty() {
                return Err(malformed_error!("type name must not be empty"));
            }
            if types.iter().any(|record| record.name == type_name) {
                return Err(malformed_error!("duplicate type '{}'", type_name));
            }

            let raw_flags = parser.read_u8()?;
            let flags = TypeFlags::from_bits(raw_flags).ok_or_else(|| {
                malformed_error!("unknown type flags 0x{:02X} on '{}'", raw_flags, type_name)
            })?;

            let field_count = parser.read_u16()?;
            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                fields.push(parser.read_str()?);
            }

            types.push(TypeRecord {
                name: type_name,
                flags,
                fields,
            });
        }

        let payload_len = parser.read_u32()? as usize;
        let payload = parser.read_bytes(payload_len)?.to_vec();

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing byte(s) after payload",
                parser.len() - parser.pos()
            ));
        }

        Ok(ModuleImage {
            name,
            dependencies,
            types,
            payload,
        })
    }
}

/// Builder that encodes a [`ModuleImage`] into container bytes.
///
/// Used by the in-process compile backend to emit images, and by tests to craft
/// fixtures without a compiler.
///
/// # Examples
///
/// ```rust
/// use dynload::image::format::{ImageBuilder, ModuleImage};
///
/// let bytes = ImageBuilder::new("empty").build();
/// assert!(ModuleImage::parse(&bytes).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    name: String,
    dependencies: Vec<String>,
    types: Vec<TypeRecord>,
    payload: Vec<u8>,
}

impl ImageBuilder {
    /// Create a builder for a module with the given name.
    ///
    /// An empty name produces an anonymous image, which can only be loaded with
    /// an identifier hint.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        ImageBuilder {
            name: name.into(),
            dependencies: Vec::new(),
            types: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Declare a dependency on another module.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add a type record.
    #[must_use]
    pub fn with_type(mut self, record: TypeRecord) -> Self {
        self.types.push(record);
        self
    }

    /// Set the opaque payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Encode the image into container bytes.
    ///
    /// The format stores counts and string lengths as `u16` and the payload
    /// length as `u32`; entries and bytes beyond those limits are dropped so
    /// the emitted counts always match the emitted data and the output parses.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        write_str(&mut out, &self.name);

        write_u16_count(&mut out, self.dependencies.len());
        for dependency in self.dependencies.iter().take(usize::from(u16::MAX)) {
            write_str(&mut out, dependency);
        }

        write_u16_count(&mut out, self.types.len());
        for record in self.types.iter().take(usize::from(u16::MAX)) {
            write_str(&mut out, &record.name);
            out.push(record.flags.bits());
            write_u16_count(&mut out, record.fields.len());
            for field in record.fields.iter().take(usize::from(u16::MAX)) {
                write_str(&mut out, field);
            }
        }

        let payload_len = u32::try_from(self.payload.len()).unwrap_or(u32::MAX) as usize;
        out.extend_from_slice(&(payload_len as u32).to_le_bytes());
        out.extend_from_slice(&self.payload[..payload_len]);

        out
    }
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    let mut len = value.len().min(usize::from(u16::MAX));
    // Back off to a char boundary so a clipped string stays valid UTF-8
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    out.extend_from_slice(&(len as u16).to_le_bytes());
    out.extend_from_slice(&value.as_bytes()[..len]);
}

fn write_u16_count(out: &mut Vec<u8>, count: usize) {
    let count = u16::try_from(count).unwrap_or(u16::MAX);
    out.extend_from_slice(&count.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn sample_bytes() -> Vec<u8> {
        ImageBuilder::new("widgets")
            .with_dependency("geometry")
            .with_dependency("colors")
            .with_type(TypeRecord::new(
                "Widget",
                TypeFlags::EXPORTED | TypeFlags::DEFAULT_CTOR,
                vec!["width".into(), "height".into()],
            ))
            .with_type(TypeRecord::new("Helper", TypeFlags::DEFAULT_CTOR, vec![]))
            .with_payload(b"body".to_vec())
            .build()
    }

    #[test]
    fn parse_roundtrip() {
        let image = ModuleImage::parse(&sample_bytes()).unwrap();
        assert_eq!(image.name, "widgets");
        assert_eq!(image.dependencies, vec!["geometry", "colors"]);
        assert_eq!(image.types.len(), 2);
        assert_eq!(image.types[0].name, "Widget");
        assert_eq!(image.types[0].fields, vec!["width", "height"]);
        assert!(image.types[0].flags.contains(TypeFlags::EXPORTED));
        assert!(!image.types[1].flags.contains(TypeFlags::EXPORTED));
        assert_eq!(image.payload, b"body");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(ModuleImage::parse(&[]), Err(Error::Empty)));
    }

    #[test]
    fn wrong_magic_is_malformed() {
        let mut bytes = sample_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn wrong_version_is_malformed() {
        let mut bytes = sample_bytes();
        bytes[4] = 0xFF;
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn truncated_image_is_malformed() {
        let bytes = sample_bytes();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            ModuleImage::parse(truncated),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut bytes = sample_bytes();
        bytes.push(0x00);
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn duplicate_type_is_malformed() {
        let bytes = ImageBuilder::new("dup")
            .with_type(TypeRecord::new("A", TypeFlags::EXPORTED, vec![]))
            .with_type(TypeRecord::new("A", TypeFlags::EXPORTED, vec![]))
            .build();
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn duplicate_dependency_is_malformed() {
        let bytes = ImageBuilder::new("dup")
            .with_dependency("geometry")
            .with_dependency("geometry")
            .build();
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_flags_are_malformed() {
        // Craft a record with an undefined flag bit set
        let mut bytes = ImageBuilder::new("m")
            .with_type(TypeRecord::new("T", TypeFlags::EXPORTED, vec![]))
            .build();
        // Flags byte sits right after the type name "T" (2-byte prefix + 1 byte)
        let flags_offset = bytes.len() - 4 /* payload len */ - 2 /* field count */ - 1;
        bytes[flags_offset] = 0x80;
        assert!(matches!(
            ModuleImage::parse(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn anonymous_image_parses() {
        let bytes = ImageBuilder::new("").build();
        let image = ModuleImage::parse(&bytes).unwrap();
        assert!(image.name.is_empty());
    }

    #[test]
    fn oversized_entry_lists_are_clipped_to_the_format_limit() {
        let mut builder = ImageBuilder::new("big");
        for i in 0..65_600_usize {
            builder = builder.with_dependency(format!("dep{i}"));
        }

        let image = ModuleImage::parse(&builder.build()).unwrap();
        assert_eq!(image.dependencies.len(), usize::from(u16::MAX));
        assert_eq!(image.dependencies[0], "dep0");
        assert_eq!(image.dependencies[65_534], "dep65534");
    }

    #[test]
    fn oversized_strings_are_clipped_on_a_char_boundary() {
        // 65,534 ASCII bytes followed by a two-byte char straddling the limit
        let long = "a".repeat(usize::from(u16::MAX) - 1) + "\u{e9}";

        let image = ModuleImage::parse(&ImageBuilder::new(&long).build()).unwrap();
        assert_eq!(image.name.len(), usize::from(u16::MAX) - 1);
        assert!(image.name.chars().all(|c| c == 'a'));
    }
}
