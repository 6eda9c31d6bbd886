//! Module loading orchestration.
//!
//! [`ModuleLoader`] ties the pieces together: it obtains image bytes from a
//! source - a file on disk, a caller-supplied buffer, or the in-process compile
//! service - and hands them to a [`LoadContext`]. Loads that do not specify a
//! context target the process-wide default context.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dynload::{CompileRequest, LoadContext, ModuleLoader};
//!
//! let loader = ModuleLoader::new().with_context(LoadContext::new("plugins"));
//!
//! // From disk
//! let from_disk = loader.load_from_path("addons/widgets.mod")?;
//!
//! // From source text; indistinguishable once loaded
//! let compiled = loader.load_from_compilation(
//!     &CompileRequest::new("gadgets").with_source("public type Gadget\n"),
//! )?;
//! # Ok::<(), dynload::Error>(())
//! ```

use std::{path::Path, sync::Arc};

use crate::{
    compile::{CompileRequest, Compiler, ImageAssembler},
    context::LoadContext,
    image::BinaryImage,
    module::Module,
    Result,
};

/// Orchestrates loading modules into a context from any image source.
///
/// By default a loader targets [`LoadContext::default_context`] and compiles
/// with the built-in [`ImageAssembler`]; both can be swapped with the builder
/// methods.
pub struct ModuleLoader {
    /// Target context for all loads
    context: Arc<LoadContext>,
    /// Compile service used by [`ModuleLoader::load_from_compilation`]
    compiler: Arc<dyn Compiler>,
}

impl ModuleLoader {
    /// Create a loader targeting the process-wide default context.
    #[must_use]
    pub fn new() -> Self {
        ModuleLoader {
            context: LoadContext::default_context().clone(),
            compiler: Arc::new(ImageAssembler::new()),
        }
    }

    /// Target a specific context instead of the default one.
    #[must_use]
    pub fn with_context(mut self, context: Arc<LoadContext>) -> Self {
        self.context = context;
        self
    }

    /// Use a different compile service.
    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// The context this loader targets.
    #[must_use]
    pub fn context(&self) -> &Arc<LoadContext> {
        &self.context
    }

    /// Read a module image from disk and load it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Io`] if the file is missing or unreadable, and
    /// propagates any load failure from the context.
    pub fn load_from_path<P: AsRef<Path>>(&self, path: P) -> Result<Arc<Module>> {
        let image = BinaryImage::from_path(path.as_ref())?;
        self.context.load(&image)
    }

    /// Load a module image from an in-memory buffer.
    ///
    /// # Errors
    /// Propagates any load failure from the context.
    pub fn load_from_memory(&self, bytes: Vec<u8>) -> Result<Arc<Module>> {
        self.context.load(&BinaryImage::from_memory(bytes))
    }

    /// Load an in-memory image, using `hint` as the identifier when the image
    /// carries no module name.
    ///
    /// # Errors
    /// Propagates any load failure from the context.
    pub fn load_from_memory_with_hint(&self, bytes: Vec<u8>, hint: &str) -> Result<Arc<Module>> {
        self.context
            .load_with_hint(&BinaryImage::from_memory(bytes), hint)
    }

    /// Compile source text in process and load the resulting image.
    ///
    /// On compile failure the context is left untouched and the full diagnostic
    /// list is surfaced; on success the image is loaded exactly as a path-based
    /// one would be.
    ///
    /// # Errors
    /// Returns [`crate::Error::Compile`] when compilation fails, and propagates
    /// any load failure from the context otherwise.
    pub fn load_from_compilation(&self, request: &CompileRequest) -> Result<Arc<Module>> {
        let image = self.compiler.compile(request)?;
        self.context.load(&image)
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("context", &self.context.name())
            .finish_non_exhaustive()
    }
}
