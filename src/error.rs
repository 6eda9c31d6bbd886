use thiserror::Error;

use crate::compile::Diagnostic;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure path in the engine surfaces as one of these variants so that callers can
/// branch on kind. No variant is fatal to the process - all failures are scoped to the single
/// load, compile or instantiate call that produced them, and none of them is retried
/// automatically.
///
/// # Error Categories
///
/// ## Image and I/O Errors
/// - [`Error::Malformed`] - Bytes that are not a well-formed module image
/// - [`Error::Empty`] - Empty input where an image was expected
/// - [`Error::Io`] - Filesystem errors while reading an image from disk
///
/// ## Load Failures
/// - [`Error::IdentityConflict`] - Identifier already loaded with different content
/// - [`Error::ResolutionCycle`] - Recursive dependency resolution exceeded its depth bound
/// - [`Error::DependencyUnresolved`] - A declared dependency could not be satisfied
///
/// ## Compilation Failures
/// - [`Error::Compile`] - The compile service rejected the request; carries the full
///   ordered diagnostic list and never a partial image
///
/// ## Construction Failures
/// - [`Error::NoDefaultConstructor`] - The target type has no zero-argument constructor
/// - [`Error::ConstructorFault`] - The constructor itself reported a failure
///
/// # Examples
///
/// ```rust,no_run
/// use dynload::{Error, ModuleLoader};
///
/// match ModuleLoader::new().load_from_path("addons/widgets.mod") {
///     Ok(module) => println!("loaded '{}'", module.identifier()),
///     Err(Error::Io(e)) => eprintln!("cannot read image: {}", e),
///     Err(Error::Malformed { message, .. }) => eprintln!("bad image: {}", message),
///     Err(e) => eprintln!("load failed: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The provided bytes are not a well-formed module image.
    ///
    /// The validity predicate of the container format rejected the input. The error
    /// includes the source location where the malformation was detected for debugging
    /// purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    ///
    /// Returned when an empty file or buffer is given where actual module image
    /// data was expected.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading an image from disk,
    /// such as a missing file, permission issues or filesystem errors. Surfaced to
    /// the caller as-is, never retried.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A module with the same identifier but different content is already loaded.
    ///
    /// Loading identical bytes under an identifier that is already present is
    /// idempotent and returns the existing module; this error covers the remaining
    /// case where the content hashes differ.
    #[error("Module '{identifier}' is already loaded in context '{context}' with different content")]
    IdentityConflict {
        /// The module identifier both loads competed for
        identifier: String,
        /// Name of the load context in which the conflict occurred
        context: String,
    },

    /// Recursive dependency resolution exceeded the maximum depth allowed.
    ///
    /// Resolution policies may re-enter `load` and `resolve`, so every top-level
    /// call carries a bounded depth counter. Exceeding it indicates a resolution
    /// cycle (or an unreasonably deep dependency chain).
    ///
    /// The associated value is the depth bound that was exceeded.
    #[error("Reached the maximum resolution depth allowed - {0}")]
    ResolutionCycle(usize),

    /// A dependency could not be resolved.
    ///
    /// Either no resolution policy is attached to the context, or the attached
    /// policy explicitly reported the dependency as unresolved.
    #[error("Dependency '{dependency}' could not be resolved in context '{context}'")]
    DependencyUnresolved {
        /// Name of the dependency that was requested
        dependency: String,
        /// Name of the load context that requested it
        context: String,
    },

    /// The compile service rejected the request.
    ///
    /// Carries the full, ordered list of diagnostics produced by the compiler
    /// backend. No module is created or added to any context on this path.
    #[error("Compilation failed with {} diagnostic(s)", diagnostics.len())]
    Compile {
        /// Diagnostics in the order the compiler detected them, never empty
        diagnostics: Vec<Diagnostic>,
    },

    /// The target type does not expose a zero-argument constructor.
    ///
    /// Surfaced at the instantiation boundary only; the owning module and its
    /// cached type descriptors are unaffected.
    #[error("Type '{0}' does not expose a default constructor")]
    NoDefaultConstructor(String),

    /// The constructor of the target type reported a failure.
    ///
    /// Surfaced at the instantiation boundary only, never affects load state.
    #[error("Constructor of type '{type_name}' failed: {message}")]
    ConstructorFault {
        /// Name of the type whose constructor failed
        type_name: String,
        /// Failure description reported by the constructor
        message: String,
    },

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories, such as invalid
    /// loader configuration.
    #[error("{0}")]
    Other(String),
}
