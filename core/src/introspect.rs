//! Module introspection
//!
//! The hub can ask the agent what a named module looks like. Since
//! nothing is loadable by name at runtime, introspection works over a
//! registry of catalogs: the host application (and a small builtin set)
//! declares each module's functions, classes and attributes up front,
//! and an import request renders the matching catalog. Underscore-
//! prefixed members are treated as private and never reported;
//! attribute values that have no JSON form are omitted silently.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{AgentError, Result};

/// Origin reported for a module, mirroring how runtimes distinguish
/// native modules from file-backed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Reported as the literal string "built-in"
    Builtin,
    /// Reported as the given source path
    File(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleFunction {
    pub name: String,
    pub params: Vec<String>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleClass {
    pub name: String,
    pub doc: Option<String>,
}

/// Declared surface of one importable module
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    name: String,
    doc: Option<String>,
    origin: ModuleOrigin,
    functions: Vec<ModuleFunction>,
    classes: Vec<ModuleClass>,
    attributes: Vec<(String, Option<Value>)>,
}

impl ModuleCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleCatalog {
            name: name.into(),
            doc: None,
            origin: ModuleOrigin::Builtin,
            functions: Vec::new(),
            classes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn origin(mut self, origin: ModuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn function(mut self, name: impl Into<String>, params: &[&str]) -> Self {
        self.functions.push(ModuleFunction {
            name: name.into(),
            params: params.iter().map(|s| s.to_string()).collect(),
            doc: None,
        });
        self
    }

    pub fn documented_function(
        mut self,
        name: impl Into<String>,
        params: &[&str],
        doc: impl Into<String>,
    ) -> Self {
        self.functions.push(ModuleFunction {
            name: name.into(),
            params: params.iter().map(|s| s.to_string()).collect(),
            doc: Some(doc.into()),
        });
        self
    }

    pub fn class(mut self, name: impl Into<String>) -> Self {
        self.classes.push(ModuleClass {
            name: name.into(),
            doc: None,
        });
        self
    }

    pub fn documented_class(mut self, name: impl Into<String>, doc: impl Into<String>) -> Self {
        self.classes.push(ModuleClass {
            name: name.into(),
            doc: Some(doc.into()),
        });
        self
    }

    /// Declare a constant. The value is probed for a JSON form right
    /// away; values that fail the probe stay registered but are left
    /// out of import results.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let name = name.into();
        let probed = serde_json::to_value(value).ok();
        if probed.is_none() {
            debug!(attribute = %name, "attribute value has no JSON form, will be omitted");
        }
        self.attributes.push((name, probed));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Rendered import result sent back to the hub. Exported values are
/// reported by type name only; their contents stay host-side.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleImportResult {
    pub imported: bool,
    pub module_name: String,
    /// Name the module is bound to; equals `module_name` without alias
    pub bound_name: String,
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub functions: Vec<Value>,
    pub classes: Vec<Value>,
    pub values: Map<String, Value>,
}

impl ModuleImportResult {
    pub fn to_value(&self) -> Value {
        // Serialization of this plain data shape cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Thread-safe catalog store keyed by module name
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    catalogs: RwLock<HashMap<String, ModuleCatalog>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with the catalogs every agent exposes
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(
            ModuleCatalog::new("math")
                .doc("Mathematical constants and helpers")
                .attribute("pi", std::f64::consts::PI)
                .attribute("e", std::f64::consts::E)
                .attribute("tau", std::f64::consts::TAU)
                .attribute("_precision", 64)
                .function("sqrt", &["x"])
                .function("pow", &["base", "exp"])
                .function("floor", &["x"])
                .function("ceil", &["x"]),
        );
        registry.register(
            ModuleCatalog::new("time")
                .doc("Wall-clock helpers")
                .function("now", &[])
                .function("monotonic", &[]),
        );
        registry.register(
            ModuleCatalog::new("json")
                .doc("Structural encoding and decoding")
                .function("dumps", &["value"])
                .function("loads", &["text"])
                .documented_class("Decoder", "Streaming structural decoder")
                .documented_class("Encoder", "Streaming structural encoder"),
        );
        registry
    }

    /// Add or replace a catalog
    pub fn register(&self, catalog: ModuleCatalog) {
        let mut catalogs = self.catalogs.write();
        if catalogs.contains_key(catalog.name()) {
            debug!(module = %catalog.name(), "replacing module catalog");
        }
        catalogs.insert(catalog.name().to_string(), catalog);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalogs.read().contains_key(name)
    }

    /// Render the catalog for `name`, optionally bound under `alias`.
    pub fn import(&self, name: &str, alias: Option<&str>) -> Result<ModuleImportResult> {
        let catalogs = self.catalogs.read();
        let catalog = catalogs.get(name).ok_or_else(|| AgentError::ImportError {
            module: name.to_string(),
        })?;

        if let Some(alias) = alias {
            if alias.is_empty() {
                return Err(AgentError::Introspection {
                    module: name.to_string(),
                    message: "alias must not be empty".to_string(),
                });
            }
        }

        let origin = match &catalog.origin {
            ModuleOrigin::Builtin => "built-in".to_string(),
            ModuleOrigin::File(path) => path.clone(),
        };

        let functions = catalog
            .functions
            .iter()
            .filter(|f| !f.name.starts_with('_'))
            .map(|f| {
                json!({
                    "name": f.name,
                    "params": f.params,
                    "doc": f.doc,
                })
            })
            .collect();

        let classes = catalog
            .classes
            .iter()
            .filter(|c| !c.name.starts_with('_'))
            .map(|c| {
                json!({
                    "name": c.name,
                    "doc": c.doc,
                })
            })
            .collect();

        let mut values = Map::new();
        for (attr_name, value) in &catalog.attributes {
            if attr_name.starts_with('_') {
                continue;
            }
            // Values that failed the JSON probe at declaration time
            // are silently left out.
            if let Some(value) = value {
                values.insert(attr_name.clone(), json!(value_type_name(value)));
            }
        }

        Ok(ModuleImportResult {
            imported: true,
            module_name: catalog.name.clone(),
            bound_name: alias.unwrap_or(name).to_string(),
            origin,
            doc: catalog.doc.clone(),
            functions,
            classes,
            values,
        })
    }
}

/// Type name reported for an exported value
fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
