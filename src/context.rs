//! Isolated load contexts.
//!
//! A [`LoadContext`] is an isolated namespace of loaded modules: within one
//! context a module identifier maps to at most one [`Module`], while independent
//! contexts may hold different modules under the same identifier. Each context
//! carries at most one attached [`ResolutionPolicy`] that is consulted when a
//! requested dependency is absent from the context's map.
//!
//! # Key Behaviors
//!
//! - **Idempotence** - Loading the same identifier with identical bytes returns
//!   the existing module handle; a second load has no observable side effect.
//! - **Conflict detection** - Loading different bytes under a present identifier
//!   fails with [`Error::IdentityConflict`].
//! - **Recursive resolution** - Policies may re-enter `load`/`resolve`; every
//!   top-level call carries a depth bound so cyclic resolution terminates with
//!   [`Error::ResolutionCycle`].
//! - **Default context** - One process-wide context exists for the lifetime of
//!   the process, created at first use.
//!
//! # Thread Safety
//!
//! The module map is a concurrent map and the policy slot a read-write lock.
//! Neither lock is held across a policy invocation, so a policy loading into
//! its own context cannot deadlock. Racing loads of the same identifier
//! converge on a single module handle.
//!
//! # Examples
//!
//! ```rust
//! use dynload::{
//!     image::{format::ImageBuilder, BinaryImage},
//!     LoadContext,
//! };
//! use std::sync::Arc;
//!
//! let context = LoadContext::new("plugins");
//! let image = BinaryImage::from_memory(ImageBuilder::new("widgets").build());
//!
//! let first = context.load(&image)?;
//! let second = context.load(&image)?;
//! assert!(Arc::ptr_eq(&first, &second));
//! # Ok::<(), dynload::Error>(())
//! ```

use std::sync::{Arc, OnceLock, RwLock, Weak};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{
    image::{format::ModuleImage, BinaryImage},
    module::Module,
    policy::{ResolutionPolicy, ResolutionRequest},
    Error, Result,
};

/// Default bound on recursive resolution depth per top-level call.
pub const DEFAULT_RESOLUTION_DEPTH: usize = 8;

/// Name of the process-wide default context.
pub const DEFAULT_CONTEXT_NAME: &str = "default";

static DEFAULT_CONTEXT: OnceLock<Arc<LoadContext>> = OnceLock::new();

/// An isolated namespace of loaded modules with pluggable dependency resolution.
///
/// Contexts are handed out as `Arc<LoadContext>` so loaded modules can keep a
/// non-owning back-reference to their owner. All operations take `&self`; the
/// context is safe to share across threads.
pub struct LoadContext {
    /// Context name, used in error messages
    name: String,
    /// Loaded modules indexed by identifier
    modules: DashMap<String, Arc<Module>>,
    /// The attached resolution policy; zero or one per context
    policy: RwLock<Option<Arc<dyn ResolutionPolicy>>>,
    /// Bound on recursive resolution depth per top-level call
    max_depth: usize,
    /// Back-reference handed to loaded modules
    this: Weak<LoadContext>,
}

impl LoadContext {
    /// Create a new, empty context with the default resolution depth bound.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_resolution_depth(name, DEFAULT_RESOLUTION_DEPTH)
    }

    /// Create a new, empty context with an explicit resolution depth bound.
    #[must_use]
    pub fn with_resolution_depth(name: impl Into<String>, max_depth: usize) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| LoadContext {
            name,
            modules: DashMap::new(),
            policy: RwLock::new(None),
            max_depth,
            this: this.clone(),
        })
    }

    /// The process-wide default context, created once at first use.
    ///
    /// This is the implicit target for loads that do not specify a context.
    pub fn default_context() -> &'static Arc<LoadContext> {
        DEFAULT_CONTEXT.get_or_init(|| LoadContext::new(DEFAULT_CONTEXT_NAME))
    }

    /// The context's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of modules currently loaded in this context.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if no modules are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns `true` if a module with the given identifier is loaded.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.modules.contains_key(identifier)
    }

    /// Look up a loaded module by identifier without consulting the policy.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Arc<Module>> {
        self.modules.get(identifier).map(|entry| entry.clone())
    }

    /// Identifiers of all loaded modules.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.modules.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Attach a resolution policy to this context.
    ///
    /// Exactly one policy is active at a time; the previous one, if any, is
    /// discarded.
    pub fn set_resolution_policy(&self, policy: Arc<dyn ResolutionPolicy>) {
        *write_lock!(self.policy) = Some(policy);
    }

    /// Returns `true` if a resolution policy is attached.
    #[must_use]
    pub fn has_resolution_policy(&self) -> bool {
        read_lock!(self.policy).is_some()
    }

    /// Load a binary image into this context.
    ///
    /// The image's declared dependencies are resolved through the attached
    /// policy before the module becomes visible. Loading the same identifier
    /// with identical content is idempotent and returns the existing handle.
    ///
    /// # Errors
    /// - [`Error::Malformed`] / [`Error::Empty`] if the bytes are not a
    ///   well-formed module image, or the image is anonymous
    /// - [`Error::IdentityConflict`] if the identifier is present with
    ///   different content
    /// - [`Error::DependencyUnresolved`] if a declared dependency cannot be
    ///   satisfied
    /// - [`Error::ResolutionCycle`] if recursive resolution exceeds the depth
    ///   bound
    pub fn load(&self, image: &BinaryImage) -> Result<Arc<Module>> {
        self.load_at(image, None, 0)
    }

    /// Load a binary image, using `hint` as the identifier when the image
    /// itself carries no module name.
    ///
    /// # Errors
    /// Same failure modes as [`LoadContext::load`].
    pub fn load_with_hint(&self, image: &BinaryImage, hint: &str) -> Result<Arc<Module>> {
        self.load_at(image, Some(hint), 0)
    }

    /// Resolve a module by name: the local map first, then the attached policy.
    ///
    /// # Errors
    /// - [`Error::DependencyUnresolved`] if the name is absent and no policy is
    ///   attached, or the policy reports it unresolved
    /// - [`Error::ResolutionCycle`] if recursive resolution exceeds the depth
    ///   bound
    pub fn resolve(&self, name: &str) -> Result<Arc<Module>> {
        self.resolve_at(name, 0)
    }

    pub(crate) fn load_at(
        &self,
        image: &BinaryImage,
        hint: Option<&str>,
        depth: usize,
    ) -> Result<Arc<Module>> {
        if depth > self.max_depth {
            return Err(Error::ResolutionCycle(self.max_depth));
        }

        let parsed = ModuleImage::parse(image.data())?;
        let identifier = if parsed.name.is_empty() {
            match hint {
                Some(hint) if !hint.is_empty() => hint.to_string(),
                _ => {
                    return Err(malformed_error!(
                        "image carries no module name and no identifier hint was given"
                    ))
                }
            }
        } else {
            parsed.name.clone()
        };

        // Idempotence / conflict check before any dependency work
        if let Some(existing) = self.get(&identifier) {
            return self.existing_or_conflict(existing, image);
        }

        // Resolve declared dependencies; no map lock is held here, so the
        // policy is free to load into this context
        for dependency in &parsed.dependencies {
            self.resolve_at(dependency, depth + 1)?;
        }

        let module = Module::new(
            identifier.clone(),
            parsed,
            image.origin().clone(),
            *image.content_hash(),
            self.this.clone(),
        );

        // A racing load of the same identifier keeps whichever module landed
        // first; both callers observe the same handle
        match self.modules.entry(identifier) {
            Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                drop(entry);
                self.existing_or_conflict(existing, image)
            }
            Entry::Vacant(entry) => {
                entry.insert(module.clone());
                Ok(module)
            }
        }
    }

    pub(crate) fn resolve_at(&self, name: &str, depth: usize) -> Result<Arc<Module>> {
        if depth > self.max_depth {
            return Err(Error::ResolutionCycle(self.max_depth));
        }

        if let Some(module) = self.get(name) {
            return Ok(module);
        }

        // Clone the policy handle out of the slot so no lock is held across
        // the (possibly re-entrant) policy call
        let policy = read_lock!(self.policy).clone();
        let Some(policy) = policy else {
            return Err(self.unresolved(name));
        };

        let context = self
            .this
            .upgrade()
            .ok_or_else(|| Error::Other("load context was dropped".to_string()))?;
        let request = ResolutionRequest::new(name, context, depth);

        match policy.resolve(&request)? {
            Some(module) => Ok(module),
            None => Err(self.unresolved(name)),
        }
    }

    fn existing_or_conflict(
        &self,
        existing: Arc<Module>,
        image: &BinaryImage,
    ) -> Result<Arc<Module>> {
        if existing.content_hash() == image.content_hash() {
            Ok(existing)
        } else {
            Err(Error::IdentityConflict {
                identifier: existing.identifier().to_string(),
                context: self.name.clone(),
            })
        }
    }

    fn unresolved(&self, dependency: &str) -> Error {
        Error::DependencyUnresolved {
            dependency: dependency.to_string(),
            context: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("name", &self.name)
            .field("module_count", &self.module_count())
            .field("has_resolution_policy", &self.has_resolution_policy())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::format::{ImageBuilder, TypeFlags, TypeRecord};
    use std::collections::HashMap;

    fn image(name: &str) -> BinaryImage {
        BinaryImage::from_memory(ImageBuilder::new(name).build())
    }

    fn image_with_deps(name: &str, deps: &[&str]) -> BinaryImage {
        let mut builder = ImageBuilder::new(name);
        for dep in deps {
            builder = builder.with_dependency(*dep);
        }
        BinaryImage::from_memory(builder.build())
    }

    /// Serves images out of a fixed name -> bytes table.
    struct MapPolicy {
        images: HashMap<String, Vec<u8>>,
    }

    impl MapPolicy {
        fn new(entries: &[(&str, Vec<u8>)]) -> Arc<Self> {
            Arc::new(MapPolicy {
                images: entries
                    .iter()
                    .map(|(name, bytes)| ((*name).to_string(), bytes.clone()))
                    .collect(),
            })
        }
    }

    impl ResolutionPolicy for MapPolicy {
        fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>> {
            match self.images.get(request.dependency()) {
                Some(bytes) => request
                    .load_image(&BinaryImage::from_memory(bytes.clone()))
                    .map(Some),
                None => Ok(None),
            }
        }
    }

    /// Resolves "A" by requesting "B" and "B" by requesting "A".
    struct PingPongPolicy;

    impl ResolutionPolicy for PingPongPolicy {
        fn resolve(&self, request: &ResolutionRequest<'_>) -> Result<Option<Arc<Module>>> {
            let other = if request.dependency() == "A" { "B" } else { "A" };
            request.resolve(other).map(Some)
        }
    }

    #[test]
    fn load_is_idempotent() {
        let context = LoadContext::new("t");
        let img = image("widgets");

        let first = context.load(&img).unwrap();
        let second = context.load(&img).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(context.module_count(), 1);
    }

    #[test]
    fn conflicting_content_is_rejected() {
        let context = LoadContext::new("t");
        context.load(&image("widgets")).unwrap();

        let different = BinaryImage::from_memory(
            ImageBuilder::new("widgets")
                .with_type(TypeRecord::new("Extra", TypeFlags::EXPORTED, vec![]))
                .build(),
        );

        assert!(matches!(
            context.load(&different),
            Err(Error::IdentityConflict { identifier, context })
                if identifier == "widgets" && context == "t"
        ));
        assert_eq!(context.module_count(), 1);
    }

    #[test]
    fn same_identifier_in_separate_contexts() {
        let a = LoadContext::new("a");
        let b = LoadContext::new("b");

        let in_a = a.load(&image("widgets")).unwrap();
        let in_b = b.load(&image("widgets")).unwrap();

        assert!(!Arc::ptr_eq(&in_a, &in_b));
        assert_eq!(in_a.context().unwrap().name(), "a");
        assert_eq!(in_b.context().unwrap().name(), "b");
    }

    #[test]
    fn anonymous_image_requires_hint() {
        let context = LoadContext::new("t");
        let anonymous = BinaryImage::from_memory(ImageBuilder::new("").build());

        assert!(matches!(
            context.load(&anonymous),
            Err(Error::Malformed { .. })
        ));

        let module = context.load_with_hint(&anonymous, "from-hint").unwrap();
        assert_eq!(module.identifier(), "from-hint");
        assert!(context.contains("from-hint"));
    }

    #[test]
    fn named_image_ignores_hint() {
        let context = LoadContext::new("t");
        let module = context.load_with_hint(&image("real-name"), "hint").unwrap();
        assert_eq!(module.identifier(), "real-name");
        assert!(!context.contains("hint"));
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let context = LoadContext::new("t");
        let garbage = BinaryImage::from_memory(b"not a module image".to_vec());

        assert!(matches!(context.load(&garbage), Err(Error::Malformed { .. })));
        assert!(context.is_empty());
    }

    #[test]
    fn missing_dependency_without_policy() {
        let context = LoadContext::new("t");
        let img = image_with_deps("app", &["geometry"]);

        assert!(matches!(
            context.load(&img),
            Err(Error::DependencyUnresolved { dependency, .. }) if dependency == "geometry"
        ));
        // The failed load leaves no partial state behind
        assert!(context.is_empty());
    }

    #[test]
    fn resolve_prefers_local_map() {
        let context = LoadContext::new("t");
        let loaded = context.load(&image("widgets")).unwrap();

        // No policy attached; the map alone satisfies the request
        let resolved = context.resolve("widgets").unwrap();
        assert!(Arc::ptr_eq(&loaded, &resolved));
    }

    #[test]
    fn resolve_is_deterministic_through_policy() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(MapPolicy::new(&[(
            "X",
            ImageBuilder::new("X").build(),
        )]));

        let first = context.resolve("X").unwrap();
        assert_eq!(first.identifier(), "X");

        // Repeated resolution hits the map and returns the same handle
        let second = context.resolve("X").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn dependencies_resolve_through_policy_during_load() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(MapPolicy::new(&[(
            "geometry",
            ImageBuilder::new("geometry").build(),
        )]));

        let module = context.load(&image_with_deps("app", &["geometry"])).unwrap();
        assert_eq!(module.dependencies(), ["geometry"]);
        assert!(context.contains("geometry"));
        assert_eq!(context.module_count(), 2);
    }

    #[test]
    fn transitive_dependencies_resolve() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(MapPolicy::new(&[
            (
                "middle",
                ImageBuilder::new("middle").with_dependency("leaf").build(),
            ),
            ("leaf", ImageBuilder::new("leaf").build()),
        ]));

        context.load(&image_with_deps("root", &["middle"])).unwrap();
        assert_eq!(context.module_count(), 3);
    }

    #[test]
    fn cyclic_policy_fails_with_resolution_cycle() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(Arc::new(PingPongPolicy));

        assert!(matches!(
            context.resolve("A"),
            Err(Error::ResolutionCycle(DEFAULT_RESOLUTION_DEPTH))
        ));
    }

    #[test]
    fn cyclic_image_dependencies_fail_with_resolution_cycle() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(MapPolicy::new(&[
            ("A", ImageBuilder::new("A").with_dependency("B").build()),
            ("B", ImageBuilder::new("B").with_dependency("A").build()),
        ]));

        assert!(matches!(
            context.load(&image_with_deps("root", &["A"])),
            Err(Error::ResolutionCycle(DEFAULT_RESOLUTION_DEPTH))
        ));
    }

    #[test]
    fn depth_bound_is_configurable() {
        let context = LoadContext::with_resolution_depth("t", 3);
        context.set_resolution_policy(Arc::new(PingPongPolicy));

        assert!(matches!(
            context.resolve("A"),
            Err(Error::ResolutionCycle(3))
        ));
    }

    #[test]
    fn replacing_policy_discards_previous() {
        let context = LoadContext::new("t");
        context.set_resolution_policy(MapPolicy::new(&[("X", ImageBuilder::new("X").build())]));
        context.set_resolution_policy(MapPolicy::new(&[("Y", ImageBuilder::new("Y").build())]));

        assert!(matches!(
            context.resolve("X"),
            Err(Error::DependencyUnresolved { .. })
        ));
        assert!(context.resolve("Y").is_ok());
    }

    #[test]
    fn default_context_is_a_singleton() {
        let first = LoadContext::default_context();
        let second = LoadContext::default_context();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(first.name(), DEFAULT_CONTEXT_NAME);
    }
}
