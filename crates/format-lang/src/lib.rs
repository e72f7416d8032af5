// Runtime interpreter for declarative binary format descriptions
//
// Takes a schema describing how a binary format is laid out plus a byte
// buffer, and produces a navigable value tree. The schema is consumed at
// runtime; nothing is generated.

pub mod encoding;
pub mod error;
pub mod expr;
pub mod interp;
pub mod schema;
pub mod span;
pub mod stream;
pub mod value;

pub use error::Error;
pub use interp::Interpreter;
pub use schema::validate::{ValidationIssue, ValidationReport};
pub use schema::Schema;
pub use stream::ByteStream;
pub use value::Value;

use rustc_hash::FxHashMap;
use std::rc::Rc;

/// A named content transform applied between reading a field's bytes and
/// interpreting them (the `process` directive's extension point).
pub trait ProcessFilter {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, Error>;
}

pub type FilterMap = FxHashMap<String, Rc<dyn ProcessFilter>>;

/// Options for a parse run.
#[derive(Clone)]
pub struct ParseOptions {
    /// Validate the schema document before interpreting (default true).
    /// When off, structural violations surface later as interpreter errors.
    pub validate: bool,
    /// Promote validation warnings to errors (default false).
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate: true,
            strict: false,
        }
    }
}

/// Main entry point: owns the process-filter registry and composes the
/// pipeline schema document → validation → model → interpretation.
pub struct FormatEngine {
    filters: FilterMap,
}

impl FormatEngine {
    pub fn new() -> Self {
        Self {
            filters: FilterMap::default(),
        }
    }

    /// Register a named process filter. Fields whose `process` directive
    /// names it run their raw bytes through the filter before
    /// interpretation.
    pub fn with_filter(mut self, name: impl Into<String>, filter: impl ProcessFilter + 'static) -> Self {
        self.filters.insert(name.into(), Rc::new(filter));
        self
    }

    /// Parse a byte buffer against a schema source, producing the value
    /// tree.
    pub fn parse(
        &self,
        schema_source: &str,
        data: &[u8],
        options: &ParseOptions,
    ) -> Result<Value, Error> {
        let doc: serde_json::Value = serde_json::from_str(schema_source)
            .map_err(|e| Error::validation(format!("malformed schema document: {}", e)))?;
        if options.validate {
            let report = schema::validate::validate(&doc, options.strict);
            if !report.valid {
                let summary = report
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(Error::validation(summary));
            }
        }
        let schema = schema::load::from_document(&doc)?;
        Interpreter::new(Rc::new(self.filters.clone())).parse(&schema, data)
    }

    /// Validate a schema source without parsing any data.
    pub fn validate(&self, schema_source: &str, strict: bool) -> Result<ValidationReport, Error> {
        let doc: serde_json::Value = serde_json::from_str(schema_source)
            .map_err(|e| Error::validation(format!("malformed schema document: {}", e)))?;
        Ok(schema::validate::validate(&doc, strict))
    }
}

impl Default for FormatEngine {
    fn default() -> Self {
        Self::new()
    }
}
