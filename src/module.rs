//! Loaded module handles.
//!
//! A [`Module`] is one loaded binary unit: its identifier, origin, content hash,
//! decoded image and the lazily computed list of exported type descriptors. It is
//! created by a successful load into a [`crate::LoadContext`], is immutable from
//! then on, and lives until its owning context is torn down.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    context::LoadContext,
    image::{
        format::{ModuleImage, TypeFlags},
        ImageOrigin,
    },
    reflect::{Constructor, Instance, TypeDescriptor},
    Error,
};

/// One loaded binary unit and its introspectable type surface.
///
/// Modules are handed out as `Arc<Module>`; the same identifier loaded twice
/// into one context yields the same allocation. The exported type list is
/// computed on first access and cached for the module's lifetime.
///
/// # Examples
///
/// ```rust
/// use dynload::{
///     image::{format::ImageBuilder, BinaryImage},
///     LoadContext,
/// };
///
/// let context = LoadContext::new("demo");
/// let image = BinaryImage::from_memory(ImageBuilder::new("widgets").build());
/// let module = context.load(&image)?;
///
/// assert_eq!(module.identifier(), "widgets");
/// assert_eq!(module.context().unwrap().name(), "demo");
/// # Ok::<(), dynload::Error>(())
/// ```
pub struct Module {
    /// Unique identifier within the owning context
    identifier: String,
    /// Where the image bytes came from
    origin: ImageOrigin,
    /// SHA-1 over the raw image bytes, used for idempotence checks
    content_hash: [u8; 20],
    /// Owning context; exactly one, never reassigned
    context: Weak<LoadContext>,
    /// The decoded image this module was loaded from
    image: ModuleImage,
    /// Exported type descriptors, populated on first introspection
    exports: OnceLock<Vec<TypeDescriptor>>,
}

impl Module {
    pub(crate) fn new(
        identifier: String,
        image: ModuleImage,
        origin: ImageOrigin,
        content_hash: [u8; 20],
        context: Weak<LoadContext>,
    ) -> Arc<Self> {
        Arc::new(Module {
            identifier,
            origin,
            content_hash,
            context,
            image,
            exports: OnceLock::new(),
        })
    }

    /// The module's identifier, unique within its owning context.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Where the module's image bytes came from.
    #[must_use]
    pub fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    /// SHA-1 hash of the raw image bytes.
    #[must_use]
    pub fn content_hash(&self) -> &[u8; 20] {
        &self.content_hash
    }

    /// The load context that owns this module, if it is still alive.
    #[must_use]
    pub fn context(&self) -> Option<Arc<LoadContext>> {
        self.context.upgrade()
    }

    /// Names of the modules this module declares as dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.image.dependencies
    }

    /// The opaque payload carried by the module image.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.image.payload
    }

    /// Enumerate the module's exported types.
    ///
    /// Computed once per module by walking the image's type records and keeping
    /// those marked as exported, in record order; cached thereafter. The returned
    /// descriptors carry the construction capability for types that expose a
    /// zero-argument constructor.
    #[must_use]
    pub fn exported_types(self: &Arc<Self>) -> &[TypeDescriptor] {
        self.exports.get_or_init(|| {
            self.image
                .types
                .iter()
                .filter(|record| record.flags.contains(TypeFlags::EXPORTED))
                .map(|record| {
                    let constructor = if record.flags.contains(TypeFlags::DEFAULT_CTOR) {
                        Some(make_constructor(
                            record.name.clone(),
                            self.identifier.clone(),
                            record.fields.clone(),
                            record.flags.contains(TypeFlags::CTOR_FAULT),
                        ))
                    } else {
                        None
                    };

                    TypeDescriptor::new(record.name.clone(), Arc::downgrade(self), constructor)
                })
                .collect()
        })
    }
}

fn make_constructor(
    type_name: String,
    module: String,
    fields: Vec<String>,
    faulting: bool,
) -> Constructor {
    Arc::new(move || {
        if faulting {
            return Err(Error::ConstructorFault {
                type_name: type_name.clone(),
                message: "module initializer reported failure".to_string(),
            });
        }
        Ok(Instance::new(
            type_name.clone(),
            module.clone(),
            fields.clone(),
        ))
    })
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("identifier", &self.identifier)
            .field("origin", &self.origin)
            .field("dependencies", &self.image.dependencies)
            .field("types", &self.image.types.len())
            .finish_non_exhaustive()
    }
}
