//! Pluggable dependency resolution.
//!
//! When a load context misses a requested dependency, it hands a
//! [`ResolutionRequest`] to its attached [`ResolutionPolicy`]. Policies are
//! explicit, per-context strategy objects - there is no global resolving event -
//! so resolution behavior can be exercised in isolation. A policy may re-enter
//! the context (load an image, resolve a further dependency) through the request
//! object, which threads the depth bound through recursive resolution.
//!
//! # Provided Policies
//!
//! - [`DirectoryPolicy`] - Maps a dependency name to a file in a fixed external
//!   directory and path-loads it into the requesting context.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dynload::{DirectoryPolicy, LoadContext};
//! use std::sync::Arc;
//!
//! let context = LoadContext::new("addon-host");
//! context.set_resolution_policy(Arc::new(DirectoryPolicy::new("/opt/addons")));
//! let module = context.resolve("widgets")?;
//! # Ok::<(), dynload::Error>(())
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{context::LoadContext, image::BinaryImage, module::Module, Error, Result};

/// One dependency resolution attempt.
///
/// Transient - exists only for the duration of a single policy invocation.
/// Carries the dependency name, the requesting context and the current
/// resolution depth; the re-entrant helpers below keep that depth counted so
/// cyclic policies terminate with [`Error::ResolutionCycle`] instead of
/// recursing forever.
pub struct ResolutionRequest<'a> {
    /// Name of the dependency being resolved
    dependency: &'a str,
    /// The context that issued the request
    context: Arc<LoadContext>,
    /// Depth of this request within the top-level resolve call
    depth: usize,
}

impl<'a> ResolutionRequest<'a> {
    pub(crate) fn new(dependency: &'a str, context: Arc<LoadContext>, depth: usize) -> Self {
        ResolutionRequest {
            dependency,
            context,
            depth,
        }
    }

    /// Name of the dependency being resolved.
    #[must_use]
    pub fn dependency(&self) -> &str {
        self.dependency
    }

    /// The context that issued the request.
    #[must_use]
    pub fn context(&self) -> &Arc<LoadContext> {
        &self.context
    }

    /// Load an image into the requesting context, counting against the depth
    /// bound of the current resolution.
    ///
    /// # Errors
    /// Propagates any load failure from the context.
    pub fn load_image(&self, image: &BinaryImage) -> Result<Arc<Module>> {
        self.context.load_at(image, None, self.depth + 1)
    }

    /// Read an image from disk and load it into the requesting context.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file is missing or unreadable, and propagates
    /// any load failure from the context.
    pub fn load_from_path(&self, path: &Path) -> Result<Arc<Module>> {
        let image = BinaryImage::from_path(path)?;
        self.load_image(&image)
    }

    /// Resolve a further dependency in the requesting context, counting against
    /// the depth bound of the current resolution.
    ///
    /// # Errors
    /// Propagates any resolution failure from the context.
    pub fn resolve(&self, name: &str) -> Result<Arc<Module>> {
        self.context.resolve_at(name, self.depth + 1)
    }
}

impl std::fmt::Debug for ResolutionRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionRequest")
            .field("dependency", &self.dependency)
            .field("context", &self.context.name())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Strategy for satisfying a missing module dependency at load time.
///
/// Exactly one policy is active per context at a time; attaching a new one
/// discards the previous one. Returning `Ok(None)` means "unresolved" and is
/// surfaced to the original caller as [`Error::DependencyUnresolved`].
pub trait ResolutionPolicy: Send + Sync {
    /// Attempt to resolve the requested dependency.
    ///
    /// Implementations may call back into the requesting context through the
    /// request's re-entrant helpers.
    ///
    /// # Errors
    /// Returns an error to abort the resolution with a specific failure instead
    /// of a plain "unresolved".
    fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>>;
}

/// Resolution policy that loads dependencies from a fixed external directory.
///
/// Maps a dependency name `X` to `<directory>/X.<extension>` and attempts a
/// path-based load in the requesting context. Any failure of that load - a
/// missing file, unreadable bytes, a malformed image - reports the dependency
/// as unresolved; only a resolution-cycle failure is propagated, since it must
/// abort the whole resolution.
///
/// # Examples
///
/// ```rust
/// use dynload::DirectoryPolicy;
///
/// let policy = DirectoryPolicy::new("/opt/addons").with_extension("img");
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryPolicy {
    /// Directory that holds the dependency images
    directory: PathBuf,
    /// File extension of dependency images, without the dot
    extension: String,
}

impl DirectoryPolicy {
    /// Create a policy that searches the given directory.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DirectoryPolicy {
            directory: directory.into(),
            extension: "mod".to_string(),
        }
    }

    /// Override the file extension used for dependency images (default `mod`).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn candidate(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", name, self.extension))
    }
}

impl ResolutionPolicy for DirectoryPolicy {
    fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>> {
        match request.load_from_path(&self.candidate(request.dependency())) {
            Ok(module) => Ok(Some(module)),
            Err(Error::ResolutionCycle(limit)) => Err(Error::ResolutionCycle(limit)),
            Err(_) => Ok(None),
        }
    }
}
