use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::{builtin, error::RuntimeError, runtime_value::RuntimeValue};
use crate::{ast::node::IdentName, range::Range};

#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("\"{0}\" is not defined")]
    NotDefined(IdentName),
}

impl EnvError {
    pub fn to_runtime_error(&self, range: Range) -> RuntimeError {
        match self {
            EnvError::NotDefined(name) => RuntimeError::NameError(range, name.to_string()),
        }
    }
}

/// A variable scope. Lookups fall back to the parent scope and then to builtins.
#[derive(Debug, Clone, Default)]
pub struct Env {
    context: FxHashMap<IdentName, RuntimeValue>,
    parent: Option<Weak<RefCell<Env>>>,
}

impl Env {
    pub fn with_parent(parent: Weak<RefCell<Env>>) -> Self {
        Self {
            context: FxHashMap::default(),
            parent: Some(parent),
        }
    }

    pub fn shared(self) -> Rc<RefCell<Env>> {
        Rc::new(RefCell::new(self))
    }

    #[inline(always)]
    pub fn define(&mut self, name: IdentName, value: RuntimeValue) {
        self.context.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) -> Option<RuntimeValue> {
        self.context.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.context.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<RuntimeValue> {
        self.context.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<RuntimeValue, EnvError> {
        match self.context.get(name) {
            Some(value) => Ok(value.clone()),
            None => match self.parent.as_ref().and_then(|parent| parent.upgrade()) {
                Some(parent) => parent.borrow().resolve(name),
                None if builtin::is_builtin(name) => Ok(RuntimeValue::Builtin(IdentName::new(name))),
                None => Err(EnvError::NotDefined(IdentName::new(name))),
            },
        }
    }

    /// Bindings of this scope only, sorted by name.
    pub fn locals(&self) -> Vec<(IdentName, RuntimeValue)> {
        let mut entries = self
            .context
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_define_and_resolve() {
        let mut env = Env::default();
        env.define(IdentName::new("x"), RuntimeValue::Int(42));

        assert_eq!(env.resolve("x").unwrap(), RuntimeValue::Int(42));
    }

    #[test]
    fn test_env_resolve_from_parent() {
        let parent = Env::default().shared();
        let mut child = Env::with_parent(Rc::downgrade(&parent));

        parent.borrow_mut().define(IdentName::new("g"), RuntimeValue::Int(1));
        child.define(IdentName::new("l"), RuntimeValue::Int(2));

        assert_eq!(child.resolve("g").unwrap(), RuntimeValue::Int(1));
        assert_eq!(child.resolve("l").unwrap(), RuntimeValue::Int(2));
        assert_eq!(
            parent.borrow().resolve("l"),
            Err(EnvError::NotDefined(IdentName::new("l")))
        );
    }

    #[test]
    fn test_env_shadow_parent_variable() {
        let parent = Env::default().shared();
        let mut child = Env::with_parent(Rc::downgrade(&parent));

        parent.borrow_mut().define(IdentName::new("x"), RuntimeValue::Int(1));
        child.define(IdentName::new("x"), RuntimeValue::Int(2));

        assert_eq!(child.resolve("x").unwrap(), RuntimeValue::Int(2));
        assert_eq!(parent.borrow().resolve("x").unwrap(), RuntimeValue::Int(1));
    }

    #[test]
    fn test_env_resolve_builtin() {
        let env = Env::default();
        assert!(matches!(env.resolve("len"), Ok(RuntimeValue::Builtin(_))));
    }

    #[test]
    fn test_env_locals_sorted() {
        let mut env = Env::default();
        env.define(IdentName::new("b"), RuntimeValue::Int(2));
        env.define(IdentName::new("a"), RuntimeValue::Int(1));

        let names = env.locals().into_iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, vec![IdentName::new("a"), IdentName::new("b")]);
    }
}
