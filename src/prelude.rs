//! Convenient re-exports of the most commonly used types and traits.
//!
//! This module provides a curated selection of the most frequently used types
//! from across the crate, allowing for convenient glob imports.
//!
//! # Example
//!
//! ```rust
//! use dynload::prelude::*;
//!
//! let loader = ModuleLoader::new().with_context(LoadContext::new("demo"));
//! let result = loader.load_from_compilation(
//!     &CompileRequest::new("widgets").with_source("public type Widget\n"),
//! );
//! assert!(result.is_ok());
//! ```

pub use crate::{
    compile::{CompileRequest, Compiler, Diagnostic, ImageAssembler, SourceUnit},
    context::LoadContext,
    image::{
        format::{ImageBuilder, ModuleImage, TypeFlags, TypeRecord},
        BinaryImage, ImageOrigin,
    },
    loader::ModuleLoader,
    module::Module,
    policy::{DirectoryPolicy, ResolutionPolicy, ResolutionRequest},
    reflect::{Instance, TypeDescriptor},
    Error, Result,
};
