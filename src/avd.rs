//! AVD (attribute value descriptor) and the variable model
//!
//! Every tunable parameter on a fileset, flowop or procflow — iosize, wss,
//! a file's target size, the number of process instances — is late-bound
//! through an `Avd`: either an inline literal or a reference to a named
//! [`Variable`] resolved at read time. A variable's dynamic type may still be
//! `Unknown` when it is first referenced (the parser hasn't assigned it yet);
//! reading such a variable is a configuration error, not a panic.
//!
//! Variables can also be bound to a random distribution or a custom-variable
//! plugin, in which case every read draws a fresh sample rather than
//! returning a fixed value — this is how `iosize=$myrandvar` and friends read
//! a new number on each flowop iteration.
//!
//! # Example
//!
//! ```
//! use flowbench::avd::{Avd, VariableTable};
//!
//! let vars = VariableTable::new();
//! vars.set_int("nfiles", 16);
//!
//! let literal = Avd::int(4096);
//! assert_eq!(literal.get_int(&vars).unwrap(), 4096);
//!
//! let reference = Avd::var_ref("nfiles");
//! assert_eq!(reference.get_int(&vars).unwrap(), 16);
//! ```

use crate::customvar::CustomVarPlugin;
use crate::error::FlowError;
use crate::randdist::RandDist;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A named, dynamically typed cell. Allocated on first reference; its type
/// may transition from `Unknown` to a concrete kind exactly once, on first
/// assignment.
#[derive(Clone)]
pub enum VarValue {
    Unknown,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Random(Arc<Mutex<RandDist>>),
    /// Bound to a custom-variable plugin (§6): every read draws a fresh
    /// sample via `CustomVarPlugin::next_value`, same as `Random`.
    Custom(Arc<dyn CustomVarPlugin>),
}

/// A table of named variables, shared by every `Avd::VarRef` that points
/// into it. Composite flowops layer a child `VariableTable` in front of the
/// outer one so that locally-declared names shadow the global scope (see
/// [`VariableTable::with_parent`]).
pub struct VariableTable {
    vars: Mutex<HashMap<String, VarValue>>,
    parent: Option<Arc<VariableTable>>,
}

impl VariableTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vars: Mutex::new(HashMap::new()),
            parent: None,
        })
    }

    /// A child scope used for a composite flowop's local variables: lookups
    /// that miss locally fall through to `parent`.
    pub fn with_parent(parent: Arc<VariableTable>) -> Arc<Self> {
        Arc::new(Self {
            vars: Mutex::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VarValue>> {
        self.vars.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_bool(&self, name: &str, v: bool) {
        self.lock().insert(name.to_string(), VarValue::Bool(v));
    }
    pub fn set_int(&self, name: &str, v: i64) {
        self.lock().insert(name.to_string(), VarValue::Int(v));
    }
    pub fn set_double(&self, name: &str, v: f64) {
        self.lock().insert(name.to_string(), VarValue::Double(v));
    }
    pub fn set_string(&self, name: &str, v: &str) {
        self.lock()
            .insert(name.to_string(), VarValue::Str(v.to_string()));
    }
    pub fn set_random(&self, name: &str, dist: RandDist) {
        self.lock()
            .insert(name.to_string(), VarValue::Random(Arc::new(Mutex::new(dist))));
    }
    pub fn set_custom(&self, name: &str, plugin: Arc<dyn CustomVarPlugin>) {
        self.lock().insert(name.to_string(), VarValue::Custom(plugin));
    }

    /// Look up `name`, local scope first, then parent chain.
    fn find(&self, name: &str) -> Option<VarValue> {
        if let Some(v) = self.lock().get(name).cloned() {
            return Some(v);
        }
        self.parent.as_ref().and_then(|p| p.find(name))
    }

    fn resolve_numeric(&self, name: &str) -> Result<f64, FlowError> {
        match self.find(name) {
            None | Some(VarValue::Unknown) => Err(FlowError::UnsetVariable(name.to_string())),
            Some(VarValue::Bool(b)) => Ok(if b { 1.0 } else { 0.0 }),
            Some(VarValue::Int(i)) => Ok(i as f64),
            Some(VarValue::Double(d)) => Ok(d),
            Some(VarValue::Str(s)) => s
                .parse::<f64>()
                .map_err(|_| FlowError::InvalidParameter(format!("{name} is not numeric"))),
            Some(VarValue::Random(dist)) => {
                Ok(dist.lock().unwrap_or_else(|p| p.into_inner()).next())
            }
            Some(VarValue::Custom(plugin)) => plugin.next_value(),
        }
    }

    fn resolve_string(&self, name: &str) -> Result<String, FlowError> {
        match self.find(name) {
            None | Some(VarValue::Unknown) => Err(FlowError::UnsetVariable(name.to_string())),
            Some(VarValue::Bool(b)) => Ok(b.to_string()),
            Some(VarValue::Int(i)) => Ok(i.to_string()),
            Some(VarValue::Double(d)) => Ok(d.to_string()),
            Some(VarValue::Str(s)) => Ok(s),
            Some(VarValue::Random(dist)) => {
                Ok(dist.lock().unwrap_or_else(|p| p.into_inner()).next().to_string())
            }
            Some(VarValue::Custom(plugin)) => Ok(plugin.next_value()?.to_string()),
        }
    }
}

impl Default for Arc<VariableTable> {
    fn default() -> Self {
        VariableTable::new()
    }
}

/// Attribute value descriptor: either an inline literal or a pointer to a
/// named variable, resolved lazily at read time.
#[derive(Clone)]
pub enum Avd {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    VarRef(String),
}

impl Avd {
    pub fn bool(v: bool) -> Self {
        Avd::Bool(v)
    }
    pub fn int(v: i64) -> Self {
        Avd::Int(v)
    }
    pub fn double(v: f64) -> Self {
        Avd::Double(v)
    }
    pub fn string(v: impl Into<String>) -> Self {
        Avd::Str(v.into())
    }
    pub fn var_ref(name: impl Into<String>) -> Self {
        Avd::VarRef(name.into())
    }

    pub fn get_bool(&self, vars: &VariableTable) -> Result<bool, FlowError> {
        match self {
            Avd::Bool(b) => Ok(*b),
            Avd::Int(i) => Ok(*i != 0),
            Avd::Double(d) => Ok(*d != 0.0),
            Avd::Str(s) => Ok(!s.is_empty() && s != "0" && s != "false"),
            Avd::VarRef(name) => Ok(vars.resolve_numeric(name)? != 0.0),
        }
    }

    pub fn get_int(&self, vars: &VariableTable) -> Result<i64, FlowError> {
        match self {
            Avd::Bool(b) => Ok(*b as i64),
            Avd::Int(i) => Ok(*i),
            Avd::Double(d) => Ok(*d as i64),
            Avd::Str(s) => s
                .parse()
                .map_err(|_| FlowError::InvalidParameter(format!("{s} is not an int"))),
            Avd::VarRef(name) => Ok(vars.resolve_numeric(name)? as i64),
        }
    }

    pub fn get_double(&self, vars: &VariableTable) -> Result<f64, FlowError> {
        match self {
            Avd::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Avd::Int(i) => Ok(*i as f64),
            Avd::Double(d) => Ok(*d),
            Avd::Str(s) => s
                .parse()
                .map_err(|_| FlowError::InvalidParameter(format!("{s} is not a double"))),
            Avd::VarRef(name) => vars.resolve_numeric(name),
        }
    }

    pub fn get_string(&self, vars: &VariableTable) -> Result<String, FlowError> {
        match self {
            Avd::Bool(b) => Ok(b.to_string()),
            Avd::Int(i) => Ok(i.to_string()),
            Avd::Double(d) => Ok(d.to_string()),
            Avd::Str(s) => Ok(s.clone()),
            Avd::VarRef(name) => vars.resolve_string(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_avd_roundtrips() {
        let vars = VariableTable::new();
        assert_eq!(Avd::int(42).get_int(&vars).unwrap(), 42);
        assert_eq!(Avd::double(1.5).get_double(&vars).unwrap(), 1.5);
        assert!(Avd::bool(true).get_bool(&vars).unwrap());
        assert_eq!(Avd::string("x").get_string(&vars).unwrap(), "x");
    }

    #[test]
    fn varref_resolves_and_coerces() {
        let vars = VariableTable::new();
        vars.set_int("n", 7);
        assert_eq!(Avd::var_ref("n").get_int(&vars).unwrap(), 7);
        assert_eq!(Avd::var_ref("n").get_double(&vars).unwrap(), 7.0);
        assert!(Avd::var_ref("n").get_bool(&vars).unwrap());
    }

    #[test]
    fn unresolved_varref_is_an_error() {
        let vars = VariableTable::new();
        let err = Avd::var_ref("missing").get_int(&vars).unwrap_err();
        assert!(matches!(err, FlowError::UnsetVariable(_)));
    }

    #[test]
    fn local_scope_shadows_parent() {
        let outer = VariableTable::new();
        outer.set_int("x", 1);
        let inner = VariableTable::with_parent(outer.clone());
        inner.set_int("x", 2);
        assert_eq!(Avd::var_ref("x").get_int(&inner).unwrap(), 2);
        assert_eq!(Avd::var_ref("x").get_int(&outer).unwrap(), 1);
    }

    struct FixedVar(f64);
    impl crate::customvar::CustomVarPlugin for FixedVar {
        fn name(&self) -> &str {
            "fixed"
        }
        fn next_value(&self) -> Result<f64, FlowError> {
            Ok(self.0)
        }
    }

    #[test]
    fn custom_variable_draws_through_the_plugin() {
        let vars = VariableTable::new();
        vars.set_custom("cv", Arc::new(FixedVar(3.5)));
        assert_eq!(Avd::var_ref("cv").get_double(&vars).unwrap(), 3.5);
    }
}
