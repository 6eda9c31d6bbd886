//! Introspected type descriptors and instance construction.
//!
//! This module is the engine's reflection facade. A one-time introspection pass
//! over a loaded [`crate::Module`] produces one [`TypeDescriptor`] per exported
//! type record; each descriptor carries its construction capability as a closure
//! rather than going through a general reflective invocation layer. Descriptors
//! are cached on the module and never mutated.
//!
//! # Examples
//!
//! ```rust
//! use dynload::{
//!     image::{
//!         format::{ImageBuilder, TypeFlags, TypeRecord},
//!         BinaryImage,
//!     },
//!     LoadContext,
//! };
//!
//! let context = LoadContext::new("demo");
//! let bytes = ImageBuilder::new("widgets")
//!     .with_type(TypeRecord::new(
//!         "Widget",
//!         TypeFlags::EXPORTED | TypeFlags::DEFAULT_CTOR,
//!         vec!["width".into()],
//!     ))
//!     .build();
//! let module = context.load(&BinaryImage::from_memory(bytes))?;
//!
//! let descriptor = &module.exported_types()[0];
//! let instance = descriptor.instantiate()?;
//! assert_eq!(instance.type_name(), "Widget");
//! # Ok::<(), dynload::Error>(())
//! ```

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{module::Module, Error, Result};

/// Construction capability of a type: a closure that builds a default instance.
///
/// Built once during introspection and shared by all callers of the descriptor.
pub type Constructor = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

/// Introspected description of one exported type within a module.
///
/// Holds the type name, a non-owning back-reference to the module it came from,
/// and - when the type exposes a zero-argument constructor - the capability to
/// construct a default instance.
pub struct TypeDescriptor {
    /// Type name as recorded in the image
    name: String,
    /// Non-owning back-reference to the owning module
    module: Weak<Module>,
    /// Default-construction capability, absent when the type has no
    /// zero-argument constructor
    constructor: Option<Constructor>,
}

impl TypeDescriptor {
    pub(crate) fn new(
        name: String,
        module: Weak<Module>,
        constructor: Option<Constructor>,
    ) -> Self {
        TypeDescriptor {
            name,
            module,
            constructor,
        }
    }

    /// The type's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module this descriptor was introspected from, if it is still alive.
    #[must_use]
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// Whether the type exposes a zero-argument constructor.
    #[must_use]
    pub fn has_default_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// Construct a default instance of the type.
    ///
    /// # Errors
    /// Returns [`Error::NoDefaultConstructor`] if the type lacks a zero-argument
    /// constructor, or [`Error::ConstructorFault`] if construction itself fails.
    /// Neither outcome affects the owning module or its cached descriptors.
    pub fn instantiate(&self) -> Result<Instance> {
        match &self.constructor {
            Some(constructor) => constructor(),
            None => Err(Error::NoDefaultConstructor(self.name.clone())),
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("has_default_constructor", &self.has_default_constructor())
            .finish_non_exhaustive()
    }
}

/// A default-constructed instance of an exported type.
///
/// Records which type and module it came from and the field slots the
/// constructor initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    type_name: String,
    module: String,
    fields: Vec<String>,
}

impl Instance {
    pub(crate) fn new(type_name: String, module: String, fields: Vec<String>) -> Self {
        Instance {
            type_name,
            module,
            fields,
        }
    }

    /// Name of the type this instance was constructed from.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Identifier of the module that defines the type.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Field slots initialized by the constructor, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.type_name)
    }
}
