//! Chained symbol tables
//!
//! A scope owns its bindings and holds a weak link to its parent: scopes are
//! owned by whoever created them (the simulation for the root, a service for
//! its body scope, an in-flight evaluation for operation scopes), never by
//! their children.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::runtime::error::ProgramError;

use super::value::Value;

/// One lexical scope
pub struct Environment {
    bindings: RefCell<BTreeMap<String, Value>>,
    parent: Option<Weak<Environment>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("symbols", &self.symbols())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Environment {
    /// Create a root scope
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(BTreeMap::new()),
            parent: None,
        })
    }

    /// Create a scope nested in `parent`
    pub fn child(parent: &Rc<Environment>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(BTreeMap::new()),
            parent: Some(Rc::downgrade(parent)),
        })
    }

    /// Bind `symbol` in this scope and hand the value back
    pub fn define(&self, symbol: impl Into<String>, value: Value) -> Value {
        self.bindings.borrow_mut().insert(symbol.into(), value.clone());
        value
    }

    /// Resolve `symbol` here, then in each enclosing scope
    pub fn look_up(&self, symbol: &str) -> Result<Value, ProgramError> {
        if let Some(value) = self.bindings.borrow().get(symbol) {
            return Ok(value.clone());
        }

        let mut next = self.parent.as_ref().and_then(Weak::upgrade);
        while let Some(scope) = next {
            if let Some(value) = scope.bindings.borrow().get(symbol) {
                return Ok(value.clone());
            }
            next = scope.parent.as_ref().and_then(Weak::upgrade);
        }

        Err(ProgramError::UndefinedSymbol(symbol.to_string()))
    }

    /// Whether `symbol` is bound in this scope (parents not consulted)
    pub fn is_defined_locally(&self, symbol: &str) -> bool {
        self.bindings.borrow().contains_key(symbol)
    }

    /// Symbols bound in this scope, sorted
    pub fn symbols(&self) -> Vec<String> {
        self.bindings.borrow().keys().cloned().collect()
    }
}
