//! In-process compilation service.
//!
//! This module defines the compile side of the binary image source: a
//! [`CompileRequest`] describing what to compile, the [`Compiler`] trait behind
//! which an actual compiler backend sits, and the [`Diagnostic`] records a failed
//! compilation surfaces. The engine treats compilation as an opaque
//! "source text in, binary image out" service - which backend is plugged in is
//! invisible to the loading machinery, and a compiled image is indistinguishable
//! from an on-disk one once loaded.
//!
//! The built-in backend is [`ImageAssembler`], which understands a minimal
//! line-oriented module dialect and emits container images directly.
//!
//! # Examples
//!
//! ```rust
//! use dynload::{CompileRequest, ModuleLoader};
//!
//! let request = CompileRequest::new("widgets")
//!     .with_source("public type Widget(width, height)\n");
//!
//! let module = ModuleLoader::new().load_from_compilation(&request)?;
//! assert_eq!(module.exported_types().len(), 1);
//! # Ok::<(), dynload::Error>(())
//! ```

mod assembler;

pub use assembler::ImageAssembler;

use std::fmt;

use crate::{image::BinaryImage, Result};

/// One compiler message: where it was detected and what went wrong.
///
/// Diagnostics are surfaced in the order the compiler detected them; a failed
/// compilation always carries at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Label of the source unit the message refers to, or `<request>` for
    /// request-level problems
    unit: String,
    /// 1-based line number within the unit; 0 when no line applies
    line: u32,
    /// Free-form message text
    message: String,
}

impl Diagnostic {
    /// Create a new diagnostic.
    #[must_use]
    pub fn new(unit: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            unit: unit.into(),
            line,
            message: message.into(),
        }
    }

    /// Label of the source unit this diagnostic refers to.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// 1-based line number, or 0 when no line applies.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The message text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.unit, self.message)
        } else {
            write!(f, "{}:{}: {}", self.unit, self.line, self.message)
        }
    }
}

/// One source text unit within a compile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Optional unit name used in diagnostics
    name: Option<String>,
    /// The source text
    text: String,
}

impl SourceUnit {
    /// The unit's name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Everything a compiler backend needs for one compilation: the target module
/// name, the ordered source units, implicit import directives applied uniformly
/// to every unit, and the reference images needed to resolve symbols at compile
/// time.
///
/// The reference set is an explicit input - the engine does not discover
/// compile-time references automatically.
///
/// # Examples
///
/// ```rust
/// use dynload::{
///     image::{format::ImageBuilder, BinaryImage},
///     CompileRequest,
/// };
///
/// let geometry = BinaryImage::from_memory(ImageBuilder::new("geometry").build());
///
/// let request = CompileRequest::new("widgets")
///     .with_source("public type Widget\n")
///     .with_implicit_import("geometry")
///     .with_reference(geometry);
///
/// assert_eq!(request.sources().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CompileRequest {
    /// Target module name
    name: String,
    /// Source units, in compilation order
    sources: Vec<SourceUnit>,
    /// Import directives applied uniformly to every unit
    implicit_imports: Vec<String>,
    /// Reference images available at compile time
    references: Vec<BinaryImage>,
}

impl CompileRequest {
    /// Create a request targeting the given module name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        CompileRequest {
            name: name.into(),
            sources: Vec::new(),
            implicit_imports: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Append an unnamed source unit.
    #[must_use]
    pub fn with_source(mut self, text: impl Into<String>) -> Self {
        self.sources.push(SourceUnit {
            name: None,
            text: text.into(),
        });
        self
    }

    /// Append a named source unit; the name shows up in diagnostics.
    #[must_use]
    pub fn with_named_source(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.sources.push(SourceUnit {
            name: Some(name.into()),
            text: text.into(),
        });
        self
    }

    /// Add an import directive applied uniformly to every unit.
    #[must_use]
    pub fn with_implicit_import(mut self, name: impl Into<String>) -> Self {
        self.implicit_imports.push(name.into());
        self
    }

    /// Add a reference image available for symbol resolution at compile time.
    #[must_use]
    pub fn with_reference(mut self, image: BinaryImage) -> Self {
        self.references.push(image);
        self
    }

    /// The target module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source units, in compilation order.
    #[must_use]
    pub fn sources(&self) -> &[SourceUnit] {
        &self.sources
    }

    /// The import directives applied uniformly to every unit.
    #[must_use]
    pub fn implicit_imports(&self) -> &[String] {
        &self.implicit_imports
    }

    /// The reference images available at compile time.
    #[must_use]
    pub fn references(&self) -> &[BinaryImage] {
        &self.references
    }
}

/// The opaque "compile source text to binary image" service.
///
/// Implementations either return a complete in-memory image or fail with
/// [`crate::Error::Compile`] carrying a non-empty, ordered diagnostic list -
/// never both, and never a partial image.
pub trait Compiler: Send + Sync {
    /// Compile the request into a binary image.
    ///
    /// # Errors
    /// Returns [`crate::Error::Compile`] with the full diagnostic list when the
    /// request cannot be compiled.
    fn compile(&self, request: &CompileRequest) -> Result<BinaryImage>;
}
