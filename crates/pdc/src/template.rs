use std::{
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

use pdc_lang::{Args, NativeFunction, RuntimeError, RuntimeValue, TemplateError};
use smol_str::SmolStr;

use crate::host::CodeHost;

/// Local variables of the conversion function at the point of substitution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals {
    entries: Vec<(SmolStr, RuntimeValue)>,
}

impl Locals {
    pub fn new(entries: Vec<(SmolStr, RuntimeValue)>) -> Self {
        Self { entries }
    }

    /// Reads a `locals()` dict. Entries with non-string keys are skipped.
    pub fn from_value(value: &RuntimeValue) -> Self {
        let RuntimeValue::Dict(entries) = value else {
            return Self::default();
        };
        Self {
            entries: entries
                .borrow()
                .iter()
                .filter_map(|(key, value)| key.as_str().map(|key| (SmolStr::new(key), value.clone())))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeValue> {
        self.entries
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuntimeValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type TemplateFn = dyn Fn(&str, &str, &Locals) -> Result<String, TemplateError>;

/// Produces replacement text for a `Replace` pattern: `(section, matched, locals)`.
#[derive(Clone)]
pub enum TemplateHandler {
    Native(Rc<TemplateFn>),
    /// A host-language callable taking `(section, matched, locals)`.
    Host(RuntimeValue),
}

impl TemplateHandler {
    pub fn native(func: impl Fn(&str, &str, &Locals) -> Result<String, TemplateError> + 'static) -> Self {
        TemplateHandler::Native(Rc::new(func))
    }

    /// Binds the handler to `name` in `host` so generated code can call it.
    pub fn install<H: CodeHost + ?Sized>(&self, host: &H, name: &str) {
        match self {
            TemplateHandler::Native(func) => {
                let func = Rc::clone(func);
                host.define(
                    name,
                    RuntimeValue::Native(NativeFunction::new(name, move |args| call_native(&*func, args))),
                );
            }
            TemplateHandler::Host(value) => host.define(name, value.clone()),
        }
    }
}

fn call_native(func: &TemplateFn, args: &Args) -> Result<RuntimeValue, RuntimeError> {
    match args.positional.as_slice() {
        [section, matched, locals] => {
            let section = section.to_string();
            let matched = matched.to_string();
            let replacement = func(&section, &matched, &Locals::from_value(locals))?;
            Ok(RuntimeValue::str(&replacement))
        }
        other => Err(RuntimeError::Native(format!(
            "template handler takes 3 arguments but {} were given",
            other.len()
        ))),
    }
}

impl Debug for TemplateHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TemplateHandler::Native(_) => write!(f, "TemplateHandler::Native"),
            TemplateHandler::Host(value) => write!(f, "TemplateHandler::Host({value:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdc_lang::Namespace;

    #[test]
    fn test_native_handler_receives_locals() {
        let namespace = Namespace::new("tpl");
        TemplateHandler::native(|section, matched, locals| match locals.get("n") {
            Some(n) => Ok(format!("{section}:{matched}={n}")),
            None => Err(TemplateError::new(section, matched, "n is not set")),
        })
        .install(&namespace, "tpl");

        namespace
            .exec("def conv(n):\n    return tpl('s', 'N', locals())")
            .unwrap();

        assert_eq!(
            namespace.call("conv", Args::new(vec![RuntimeValue::Int(3)])),
            Ok(RuntimeValue::str("s:N=3"))
        );
    }

    #[test]
    fn test_native_handler_error_is_template_error() {
        let namespace = Namespace::new("tpl");
        TemplateHandler::native(|section, matched, _| Err(TemplateError::new(section, matched, "unknown")))
            .install(&namespace, "tpl");
        namespace.exec("def conv():\n    return tpl('s', 'N', locals())").unwrap();

        assert_eq!(
            namespace.call("conv", Args::default()),
            Err(RuntimeError::Template(TemplateError::new("s", "N", "unknown")))
        );
    }

    #[test]
    fn test_locals_from_dict() {
        let locals = Locals::from_value(&RuntimeValue::dict(vec![
            ("a".into(), RuntimeValue::Int(1)),
            (RuntimeValue::Int(2), RuntimeValue::Int(2)),
        ]));

        assert_eq!(locals.len(), 1);
        assert_eq!(locals.get("a"), Some(&RuntimeValue::Int(1)));
        assert_eq!(locals.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["a"]);
    }
}
