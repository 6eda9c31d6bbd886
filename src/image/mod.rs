//! Binary image abstraction and backends.
//!
//! This module provides the [`BinaryImage`] type - the unit of input to a load
//! context - and abstracts over where its bytes came from. Images loaded from
//! disk use memory-mapped I/O, while compiled or caller-supplied images live in
//! owned buffers. Once wrapped in a `BinaryImage`, all sources are
//! indistinguishable to the rest of the engine apart from their recorded
//! [`ImageOrigin`].
//!
//! # Key Components
//!
//! - [`BinaryImage`] - Bytes, origin and content hash of one loadable image
//! - [`ImageOrigin`] - Where the bytes came from (path, memory, compilation)
//! - [`format`] - The module image container format and its validity predicate
//! - [`parser`] - Bounds-checked cursor reader used by the format decoder
//!
//! # Examples
//!
//! ```rust,no_run
//! use dynload::image::BinaryImage;
//! use std::path::Path;
//!
//! let image = BinaryImage::from_path(Path::new("addons/widgets.mod"))?;
//! println!("{} byte(s) from {}", image.data().len(), image.origin());
//! # Ok::<(), dynload::Error>(())
//! ```

pub mod format;
pub mod parser;

use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::Result;

/// Where the bytes of a [`BinaryImage`] came from.
///
/// Recorded on every loaded [`crate::Module`]; purely informational - compiled
/// and on-disk modules behave identically once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Read from a file on disk
    Path(PathBuf),
    /// Supplied as an in-memory buffer
    Memory,
    /// Produced by the in-process compile service
    Compiled,
}

impl fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageOrigin::Path(path) => write!(f, "path:{}", path.display()),
            ImageOrigin::Memory => write!(f, "memory"),
            ImageOrigin::Compiled => write!(f, "compiled"),
        }
    }
}

/// Backing storage for image bytes.
///
/// Disk images stay memory-mapped so large modules are paged in on demand;
/// everything else is an owned buffer.
enum ImageData {
    /// Owned in-memory buffer
    Memory(Vec<u8>),
    /// Memory-mapped file
    Mapped(Mmap),
}

impl ImageData {
    fn as_slice(&self) -> &[u8] {
        match self {
            ImageData::Memory(bytes) => bytes,
            ImageData::Mapped(map) => map,
        }
    }
}

/// One loadable binary image: bytes, origin and content hash.
///
/// The content hash (SHA-1 over the raw bytes) is what load contexts use to
/// distinguish an idempotent re-load from an identity conflict.
///
/// # Examples
///
/// ```rust
/// use dynload::image::{format::ImageBuilder, BinaryImage};
///
/// let bytes = ImageBuilder::new("widgets").build();
/// let image = BinaryImage::from_memory(bytes.clone());
/// let again = BinaryImage::from_memory(bytes);
/// assert_eq!(image.content_hash(), again.content_hash());
/// ```
pub struct BinaryImage {
    /// Backing bytes
    data: ImageData,
    /// Where the bytes came from
    origin: ImageOrigin,
    /// SHA-1 over the raw bytes
    hash: [u8; 20],
}

impl BinaryImage {
    /// Create an image by memory-mapping a file on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if the file is missing or unreadable and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(crate::Error::Empty);
        }

        // SAFETY: the mapping is read-only and the file handle is kept alive by
        // the Mmap for the mapping's lifetime.
        let map = unsafe { Mmap::map(&file)? };
        let hash = content_hash(&map);

        Ok(BinaryImage {
            data: ImageData::Mapped(map),
            origin: ImageOrigin::Path(path.to_path_buf()),
            hash,
        })
    }

    /// Create an image from an owned buffer.
    #[must_use]
    pub fn from_memory(bytes: Vec<u8>) -> Self {
        let hash = content_hash(&bytes);
        BinaryImage {
            data: ImageData::Memory(bytes),
            origin: ImageOrigin::Memory,
            hash,
        }
    }

    /// Create an image from the output of the compile service.
    #[must_use]
    pub fn from_compiled(bytes: Vec<u8>) -> Self {
        let hash = content_hash(&bytes);
        BinaryImage {
            data: ImageData::Memory(bytes),
            origin: ImageOrigin::Compiled,
            hash,
        }
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Where the bytes came from.
    #[must_use]
    pub fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    /// SHA-1 hash over the raw bytes.
    #[must_use]
    pub fn content_hash(&self) -> &[u8; 20] {
        &self.hash
    }
}

impl fmt::Debug for BinaryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryImage")
            .field("origin", &self.origin)
            .field("len", &self.data.as_slice().len())
            .field("hash", &format_args!("{:02x?}", &self.hash[..4]))
            .finish()
    }
}

fn content_hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_image_hash_is_stable() {
        let a = BinaryImage::from_memory(vec![1, 2, 3]);
        let b = BinaryImage::from_memory(vec![1, 2, 3]);
        let c = BinaryImage::from_memory(vec![1, 2, 4]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(*a.origin(), ImageOrigin::Memory);
    }

    #[test]
    fn path_image_maps_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.mod");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[9, 8, 7]).unwrap();
        drop(file);

        let image = BinaryImage::from_path(&path).unwrap();
        assert_eq!(image.data(), &[9, 8, 7]);
        assert_eq!(*image.origin(), ImageOrigin::Path(path));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = BinaryImage::from_path(Path::new("/nonexistent/image.mod"));
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mod");
        File::create(&path).unwrap();

        assert!(matches!(
            BinaryImage::from_path(&path),
            Err(crate::Error::Empty)
        ));
    }

    #[test]
    fn compiled_origin_is_recorded() {
        let image = BinaryImage::from_compiled(vec![0x4D]);
        assert_eq!(*image.origin(), ImageOrigin::Compiled);
        assert_eq!(image.origin().to_string(), "compiled");
    }
}
