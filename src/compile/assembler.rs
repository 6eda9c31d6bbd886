//! Built-in compiler backend for the module dialect.
//!
//! [`ImageAssembler`] is the reference [`Compiler`]: it parses a minimal,
//! line-oriented module dialect and emits container images directly. It exists
//! so the compile-and-load path is exercisable end to end without an external
//! toolchain; any real compiler slots in behind the same trait.
//!
//! # Dialect
//!
//! One directive per line, `#` starts a comment line:
//!
//! ```text
//! # widgets module
//! import geometry
//! public type Widget(width, height)
//! type Helper
//! public type Frozen: noctor
//! public type Broken: faulting
//! ```
//!
//! - `import X` declares a dependency on module `X`; every import, explicit or
//!   implicit, must be satisfied by a reference image of the same name.
//! - `type` declares a module-private type, `public type` an exported one.
//! - A parenthesized list declares field names.
//! - Markers after `:` adjust the constructor: `noctor` removes the default
//!   constructor, `faulting` makes it fail when invoked.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{
    compile::{CompileRequest, Compiler, Diagnostic},
    image::{
        format::{ImageBuilder, ModuleImage, TypeFlags, TypeRecord},
        BinaryImage,
    },
    Error, Result,
};

/// Label used for diagnostics that refer to the request itself rather than a
/// source line.
const REQUEST_UNIT: &str = "<request>";

/// Leading keyword of a dialect directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
enum Keyword {
    Import,
    Public,
    Type,
}

/// Constructor marker after the `:` in a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
enum TypeMarker {
    Noctor,
    Faulting,
}

/// The built-in reference compiler backend.
///
/// Stateless; a single instance can serve any number of compilations from any
/// number of threads.
///
/// # Examples
///
/// ```rust
/// use dynload::{CompileRequest, Compiler, ImageAssembler};
///
/// let image = ImageAssembler::new()
///     .compile(&CompileRequest::new("widgets").with_source("public type Widget\n"))?;
/// # Ok::<(), dynload::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAssembler;

impl ImageAssembler {
    /// Create a new assembler.
    #[must_use]
    pub fn new() -> Self {
        ImageAssembler
    }
}

impl Compiler for ImageAssembler {
    fn compile(&self, request: &CompileRequest) -> Result<BinaryImage> {
        let mut output = Assembly::new(request.name());

        if !is_identifier(request.name()) {
            output.request_diagnostic(format!("invalid module name '{}'", request.name()));
        }
        if request.sources().is_empty() {
            output.request_diagnostic("request contains no source units");
        }

        for (index, unit) in request.sources().iter().enumerate() {
            let label = unit
                .name()
                .map_or_else(|| format!("unit{index}"), ToString::to_string);

            for (line_index, raw) in unit.text().lines().enumerate() {
                let line = raw.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                output.directive(&label, (line_index + 1) as u32, line);
            }
        }

        for import in request.implicit_imports() {
            if is_identifier(import) {
                output.import(import.clone(), REQUEST_UNIT, 0);
            } else {
                output.request_diagnostic(format!("invalid implicit import '{import}'"));
            }
        }

        output.check_references(request.references());
        output.finish()
    }
}

/// One parsed import and the location of the directive that introduced it.
/// Implicit imports carry the request-level location.
struct Import {
    name: String,
    unit: String,
    line: u32,
}

/// Accumulates the parsed module surface and diagnostics for one compilation.
struct Assembly {
    name: String,
    dependencies: Vec<Import>,
    types: Vec<TypeRecord>,
    listing: String,
    diagnostics: Vec<Diagnostic>,
}

impl Assembly {
    fn new(name: &str) -> Self {
        Assembly {
            name: name.to_string(),
            dependencies: Vec::new(),
            types: Vec::new(),
            listing: String::new(),
            diagnostics: Vec::new(),
        }
    }

    fn request_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(REQUEST_UNIT, 0, message));
    }

    fn diagnostic(&mut self, unit: &str, line: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(unit, line, message));
    }

    fn import(&mut self, name: String, unit: &str, line: u32) {
        // Imports are deduplicated; repeating one is not an error
        if !self.dependencies.iter().any(|import| import.name == name) {
            self.listing.push_str(&format!("import {name}\n"));
            self.dependencies.push(Import {
                name,
                unit: unit.to_string(),
                line,
            });
        }
    }

    fn directive(&mut self, unit: &str, line: u32, text: &str) {
        let (head, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));

        match Keyword::from_str(head) {
            Ok(Keyword::Import) => {
                let name = rest.trim();
                if is_identifier(name) {
                    self.import(name.to_string(), unit, line);
                } else {
                    self.diagnostic(unit, line, format!("invalid import '{name}'"));
                }
            }
            Ok(Keyword::Public) => {
                let (head, rest) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest.trim(), ""));
                if Keyword::from_str(head) == Ok(Keyword::Type) {
                    self.type_declaration(unit, line, rest.trim(), true);
                } else {
                    self.diagnostic(unit, line, format!("expected 'type' after 'public', found '{head}'"));
                }
            }
            Ok(Keyword::Type) => self.type_declaration(unit, line, rest.trim(), false),
            Err(_) => self.diagnostic(unit, line, format!("unknown directive '{head}'")),
        }
    }

    fn type_declaration(&mut self, unit: &str, line: u32, decl: &str, exported: bool) {
        let (decl, markers) = match decl.split_once(':') {
            Some((decl, markers)) => (decl.trim(), Some(markers.trim())),
            None => (decl, None),
        };

        let (name, fields) = if let Some((name, fields_part)) = decl.split_once('(') {
            let Some(fields_part) = fields_part.trim().strip_suffix(')') else {
                self.diagnostic(unit, line, "missing ')' in field list");
                return;
            };
            let mut fields = Vec::new();
            for field in fields_part.split(',') {
                let field = field.trim();
                if field.is_empty() && fields_part.trim().is_empty() {
                    // An empty field list "()" is fine
                    continue;
                }
                if !is_identifier(field) {
                    self.diagnostic(unit, line, format!("invalid field name '{field}'"));
                    return;
                }
                fields.push(field.to_string());
            }
            (name.trim(), fields)
        } else {
            (decl, Vec::new())
        };

        if !is_identifier(name) {
            self.diagnostic(unit, line, format!("invalid type name '{name}'"));
            return;
        }
        if self.types.iter().any(|record| record.name == name) {
            self.diagnostic(unit, line, format!("duplicate type '{name}'"));
            return;
        }

        let mut flags = TypeFlags::DEFAULT_CTOR;
        if exported {
            flags |= TypeFlags::EXPORTED;
        }
        if let Some(markers) = markers {
            for marker in markers.split_whitespace() {
                match TypeMarker::from_str(marker) {
                    Ok(TypeMarker::Noctor) => flags -= TypeFlags::DEFAULT_CTOR,
                    Ok(TypeMarker::Faulting) => flags |= TypeFlags::CTOR_FAULT,
                    Err(_) => {
                        self.diagnostic(unit, line, format!("unknown type marker '{marker}'"));
                        return;
                    }
                }
            }
        }

        let visibility = if exported { "public type" } else { "type" };
        self.listing.push_str(&format!("{visibility} {name}\n"));
        self.types.push(TypeRecord::new(name, flags, fields));
    }

    fn check_references(&mut self, references: &[BinaryImage]) {
        let mut reference_names = Vec::new();
        for (index, reference) in references.iter().enumerate() {
            match ModuleImage::parse(reference.data()) {
                Ok(image) => reference_names.push(image.name),
                Err(_) => {
                    self.request_diagnostic(format!(
                        "reference image {index} is not a valid module image"
                    ));
                }
            }
        }

        for import in &self.dependencies {
            if !reference_names.contains(&import.name) {
                self.diagnostics.push(Diagnostic::new(
                    &import.unit,
                    import.line,
                    format!("unresolved reference to module '{}'", import.name),
                ));
            }
        }
    }

    fn finish(self) -> Result<BinaryImage> {
        if !self.diagnostics.is_empty() {
            return Err(Error::Compile {
                diagnostics: self.diagnostics,
            });
        }

        let mut builder = ImageBuilder::new(self.name).with_payload(self.listing.into_bytes());
        for import in self.dependencies {
            builder = builder.with_dependency(import.name);
        }
        for record in self.types {
            builder = builder.with_type(record);
        }

        Ok(BinaryImage::from_compiled(builder.build()))
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageOrigin;

    fn compile(request: &CompileRequest) -> Result<BinaryImage> {
        ImageAssembler::new().compile(request)
    }

    fn diagnostics(result: Result<BinaryImage>) -> Vec<Diagnostic> {
        match result {
            Err(Error::Compile { diagnostics }) => diagnostics,
            other => panic!("expected compile failure, got {other:?}"),
        }
    }

    #[test]
    fn minimal_source_compiles() {
        let image = compile(
            &CompileRequest::new("widgets").with_source("public type Widget(width, height)\n"),
        )
        .unwrap();

        assert_eq!(*image.origin(), ImageOrigin::Compiled);
        let parsed = ModuleImage::parse(image.data()).unwrap();
        assert_eq!(parsed.name, "widgets");
        assert_eq!(parsed.types.len(), 1);
        assert_eq!(parsed.types[0].name, "Widget");
        assert_eq!(parsed.types[0].fields, vec!["width", "height"]);
        assert!(parsed.types[0].flags.contains(TypeFlags::EXPORTED));
        assert!(parsed.types[0].flags.contains(TypeFlags::DEFAULT_CTOR));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let image = compile(&CompileRequest::new("m").with_source(
            "# header comment\n\n  \ntype Only\n",
        ))
        .unwrap();

        let parsed = ModuleImage::parse(image.data()).unwrap();
        assert_eq!(parsed.types.len(), 1);
        assert!(!parsed.types[0].flags.contains(TypeFlags::EXPORTED));
    }

    #[test]
    fn markers_adjust_constructor_flags() {
        let image = compile(&CompileRequest::new("m").with_source(
            "public type Frozen: noctor\npublic type Broken: faulting\n",
        ))
        .unwrap();

        let parsed = ModuleImage::parse(image.data()).unwrap();
        assert!(!parsed.types[0].flags.contains(TypeFlags::DEFAULT_CTOR));
        assert!(parsed.types[1].flags.contains(TypeFlags::CTOR_FAULT));
    }

    #[test]
    fn imports_require_matching_references() {
        let geometry = BinaryImage::from_memory(ImageBuilder::new("geometry").build());

        let satisfied = compile(
            &CompileRequest::new("m")
                .with_source("import geometry\ntype A\n")
                .with_reference(geometry),
        )
        .unwrap();
        assert_eq!(
            ModuleImage::parse(satisfied.data()).unwrap().dependencies,
            vec!["geometry"]
        );

        let unsatisfied = compile(&CompileRequest::new("m").with_source("import geometry\n"));
        let diags = diagnostics(unsatisfied);
        assert_eq!(diags.len(), 1);
        assert!(diags[0]
            .message()
            .contains("unresolved reference to module 'geometry'"));
    }

    #[test]
    fn unresolved_import_points_at_its_directive() {
        let result = compile(&CompileRequest::new("m").with_named_source(
            "main",
            "type A\nimport geometry\n",
        ));

        let diags = diagnostics(result);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].unit(), "main");
        assert_eq!(diags[0].line(), 2);
        assert!(diags[0]
            .message()
            .contains("unresolved reference to module 'geometry'"));
    }

    #[test]
    fn unresolved_implicit_import_is_request_level() {
        let result = compile(
            &CompileRequest::new("m")
                .with_source("type A\n")
                .with_implicit_import("runtime"),
        );

        let diags = diagnostics(result);
        assert_eq!(diags[0].unit(), "<request>");
        assert_eq!(diags[0].line(), 0);
    }

    #[test]
    fn implicit_imports_apply_to_the_module() {
        let geometry = BinaryImage::from_memory(ImageBuilder::new("geometry").build());

        let image = compile(
            &CompileRequest::new("m")
                .with_source("type A\n")
                .with_implicit_import("geometry")
                .with_reference(geometry),
        )
        .unwrap();

        assert_eq!(
            ModuleImage::parse(image.data()).unwrap().dependencies,
            vec!["geometry"]
        );
    }

    #[test]
    fn duplicate_imports_are_deduplicated() {
        let geometry = BinaryImage::from_memory(ImageBuilder::new("geometry").build());

        let image = compile(
            &CompileRequest::new("m")
                .with_source("import geometry\nimport geometry\n")
                .with_implicit_import("geometry")
                .with_reference(geometry),
        )
        .unwrap();

        assert_eq!(
            ModuleImage::parse(image.data()).unwrap().dependencies,
            vec!["geometry"]
        );
    }

    #[test]
    fn invalid_source_yields_ordered_diagnostics() {
        let result = compile(&CompileRequest::new("m").with_named_source(
            "main",
            "typ Widget\ntype Ok\ntype 9bad\n",
        ));

        let diags = diagnostics(result);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].unit(), "main");
        assert_eq!(diags[0].line(), 1);
        assert!(diags[0].message().contains("unknown directive 'typ'"));
        assert_eq!(diags[1].line(), 3);
        assert!(diags[1].message().contains("invalid type name '9bad'"));
    }

    #[test]
    fn duplicate_type_across_units_is_a_diagnostic() {
        let result = compile(
            &CompileRequest::new("m")
                .with_source("type A\n")
                .with_source("type A\n"),
        );

        let diags = diagnostics(result);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].unit(), "unit1");
        assert!(diags[0].message().contains("duplicate type 'A'"));
    }

    #[test]
    fn empty_request_is_a_diagnostic() {
        let diags = diagnostics(compile(&CompileRequest::new("m")));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message().contains("no source units"));
    }

    #[test]
    fn invalid_module_name_is_a_diagnostic() {
        let diags = diagnostics(compile(
            &CompileRequest::new("9bad").with_source("type A\n"),
        ));
        assert!(diags[0].message().contains("invalid module name '9bad'"));
    }

    #[test]
    fn malformed_reference_image_is_a_diagnostic() {
        let result = compile(
            &CompileRequest::new("m")
                .with_source("type A\n")
                .with_reference(BinaryImage::from_memory(b"junk".to_vec())),
        );

        let diags = diagnostics(result);
        assert!(diags[0]
            .message()
            .contains("reference image 0 is not a valid module image"));
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("Widget"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("My.Module2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9bad"));
        assert!(!is_identifier("has space"));
    }
}
