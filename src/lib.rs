#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

//! # dynload
//!
//! An engine for loading binary modules into isolated contexts, with pluggable
//! dependency resolution and in-process compilation.
//!
//! `dynload` provides the loading half of a dynamic module system: it takes a
//! binary image - read from disk, handed over in memory, or produced by an
//! in-process compile step - validates it, places it in an isolated
//! [`LoadContext`], resolves the module's declared dependencies through a
//! caller-supplied [`ResolutionPolicy`], and exposes the loaded module's
//! exported types for enumeration and default construction.
//!
//! ## Features
//!
//! - **Isolated load contexts** - Independent namespaces of loaded modules with
//!   a process-wide default context
//! - **Idempotent loading** - The same identifier with identical content loads
//!   once; divergent content is a typed conflict
//! - **Pluggable resolution** - Per-context strategy objects satisfy missing
//!   dependencies, with depth-bounded recursion for cyclic graphs
//! - **In-process compilation** - Source text compiles to an image behind an
//!   opaque [`Compiler`] trait; compiled and on-disk modules are
//!   indistinguishable once loaded
//! - **Capability-based construction** - Exported types are introspected once
//!   and instantiated through cached constructor closures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynload::prelude::*;
//! use std::sync::Arc;
//!
//! // Load a module from disk into a fresh context, resolving its
//! // dependencies from an addon directory
//! let context = LoadContext::new("addons");
//! context.set_resolution_policy(Arc::new(DirectoryPolicy::new("/opt/addons")));
//!
//! let loader = ModuleLoader::new().with_context(context);
//! let module = loader.load_from_path("/opt/addons/widgets.mod")?;
//!
//! // Introspect and construct
//! if let Some(descriptor) = module.exported_types().first() {
//!     let instance = descriptor.instantiate()?;
//!     println!("created {}", instance);
//! }
//! # Ok::<(), dynload::Error>(())
//! ```
//!
//! ## Compiling Source In Process
//!
//! ```rust
//! use dynload::{CompileRequest, LoadContext, ModuleLoader};
//!
//! let loader = ModuleLoader::new().with_context(LoadContext::new("jit"));
//! let module = loader.load_from_compilation(
//!     &CompileRequest::new("gadgets").with_source("public type Gadget(size)\n"),
//! )?;
//! assert_eq!(module.exported_types()[0].name(), "Gadget");
//! # Ok::<(), dynload::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`image`] - The binary image abstraction: container format, validity
//!   predicate, memory-mapped and in-memory backends
//! - [`LoadContext`] - Isolated module namespaces with idempotent loads and
//!   attached resolution policies
//! - [`ModuleLoader`] - Orchestration from image source to loaded [`Module`]
//! - [`policy`] - The [`ResolutionPolicy`] trait and the directory-based policy
//! - [`compile`] - The [`Compiler`] trait, compile requests and diagnostics
//! - [`TypeDescriptor`] / [`Instance`] - The introspection and construction
//!   surface of loaded modules
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result); every failure is a typed
//! [`Error`] variant scoped to the single call that produced it:
//!
//! ```rust
//! use dynload::{image::BinaryImage, Error, LoadContext};
//!
//! let context = LoadContext::new("demo");
//! match context.load(&BinaryImage::from_memory(b"junk".to_vec())) {
//!     Err(Error::Malformed { message, .. }) => println!("bad image: {message}"),
//!     other => println!("{other:?}"),
//! }
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

mod context;
mod loader;
mod module;
mod reflect;

/// In-process compilation: requests, diagnostics, the [`Compiler`] trait and
/// the built-in [`ImageAssembler`] backend.
pub mod compile;

/// Binary images: container format, validity predicate and byte backends.
pub mod image;

/// Pluggable dependency resolution: the [`ResolutionPolicy`] trait, resolution
/// requests and the provided [`DirectoryPolicy`].
pub mod policy;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dynload::prelude::*;
///
/// let context = LoadContext::new("demo");
/// assert!(context.is_empty());
/// ```
pub mod prelude;

/// `dynload` Result type.
///
/// A type alias for [`std::result::Result<T, Error>`] used consistently
/// throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

pub use compile::{CompileRequest, Compiler, Diagnostic, ImageAssembler, SourceUnit};
pub use context::{LoadContext, DEFAULT_CONTEXT_NAME, DEFAULT_RESOLUTION_DEPTH};
pub use error::Error;
pub use loader::ModuleLoader;
pub use module::Module;
pub use policy::{DirectoryPolicy, ResolutionPolicy, ResolutionRequest};
pub use reflect::{Constructor, Instance, TypeDescriptor};
