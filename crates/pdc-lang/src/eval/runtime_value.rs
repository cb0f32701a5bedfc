use std::{
    cell::RefCell,
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    path::PathBuf,
    rc::{Rc, Weak},
};

use itertools::Itertools;
use smol_str::SmolStr;

use super::error::RuntimeError;
use crate::{
    ast::node::{Block, IdentName, ParamKind, Tree},
    ast::render::{format_float, repr_str},
    namespace::{Namespace, NamespaceInner},
    range::Range,
};

pub type List = Rc<RefCell<Vec<RuntimeValue>>>;
pub type Dict = Rc<RefCell<Vec<(RuntimeValue, RuntimeValue)>>>;
pub type NativeFn = dyn Fn(&Args) -> Result<RuntimeValue, RuntimeError>;

#[derive(Clone, Default)]
pub enum RuntimeValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(List),
    Tuple(Rc<[RuntimeValue]>),
    /// Insertion-ordered mapping.
    Dict(Dict),
    Function(Rc<Function>),
    Native(NativeFunction),
    Builtin(IdentName),
    Partial(Rc<Partial>),
    BoundMethod(Rc<BoundMethod>),
}

/// Positional and keyword arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<RuntimeValue>,
    pub keywords: Vec<(IdentName, RuntimeValue)>,
}

impl Args {
    pub fn new(positional: Vec<RuntimeValue>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: RuntimeValue) -> Self {
        self.keywords.push((SmolStr::new(name), value));
        self
    }

    pub fn keyword(&self, name: &str) -> Option<&RuntimeValue> {
        self.keywords
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Returns a copy with `bound` placed in front of the positional arguments.
    pub fn prepend(&self, bound: &Args) -> Args {
        Args {
            positional: bound
                .positional
                .iter()
                .chain(self.positional.iter())
                .cloned()
                .collect(),
            keywords: bound
                .keywords
                .iter()
                .filter(|(name, _)| self.keyword(name).is_none())
                .chain(self.keywords.iter())
                .cloned()
                .collect(),
        }
    }
}

impl From<Vec<RuntimeValue>> for Args {
    fn from(positional: Vec<RuntimeValue>) -> Self {
        Args::new(positional)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub name: IdentName,
    pub default: Option<RuntimeValue>,
    pub kind: ParamKind,
}

/// A function defined in host code.
///
/// Functions resolve free names against the globals of the namespace they
/// were defined in. They do not capture enclosing local scopes.
pub struct Function {
    pub name: IdentName,
    pub params: Vec<FunctionParam>,
    pub range: Range,
    pub is_generator: bool,
    pub(crate) body: Block,
    pub(crate) tree: Rc<Tree>,
    pub(crate) namespace: Weak<NamespaceInner>,
    pub(crate) source: Rc<str>,
}

impl Function {
    pub fn namespace(&self) -> Option<Namespace> {
        self.namespace.upgrade().map(Namespace::from_inner)
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.namespace.upgrade().and_then(|inner| inner.file.clone())
    }

    /// The lines of the definition and the 1-based line number of the first one.
    pub fn source_lines(&self) -> (Vec<String>, u32) {
        let start = self.range.start.line;
        let lines = self
            .source
            .lines()
            .skip(start.saturating_sub(1) as usize)
            .take((self.range.end.line.saturating_sub(start) + 1) as usize)
            .map(str::to_string)
            .collect();
        (lines, start)
    }

    pub fn source(&self) -> String {
        self.source_lines().0.join("\n")
    }
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("range", &self.range)
            .finish()
    }
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: IdentName,
    pub func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        func: impl Fn(&Args) -> Result<RuntimeValue, RuntimeError> + 'static,
    ) -> Self {
        Self {
            name: SmolStr::new(name),
            func: Rc::new(func),
        }
    }
}

/// A callable with some arguments already bound.
#[derive(Debug, Clone)]
pub struct Partial {
    pub func: RuntimeValue,
    pub bound: Args,
}

impl Partial {
    /// The innermost wrapped callable.
    pub fn target(&self) -> &RuntimeValue {
        match &self.func {
            RuntimeValue::Partial(inner) => inner.target(),
            other => other,
        }
    }

    /// All bound arguments, outermost last.
    pub fn bound_args(&self) -> Args {
        match &self.func {
            RuntimeValue::Partial(inner) => self.bound.prepend(&inner.bound_args()),
            _ => self.bound.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: RuntimeValue,
    pub name: IdentName,
}

impl RuntimeValue {
    pub const NONE: RuntimeValue = RuntimeValue::None;

    pub fn str(s: &str) -> Self {
        RuntimeValue::Str(Rc::from(s))
    }

    pub fn list(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::Tuple(Rc::from(items))
    }

    pub fn dict(entries: Vec<(RuntimeValue, RuntimeValue)>) -> Self {
        RuntimeValue::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::None => "NoneType",
            RuntimeValue::Bool(_) => "bool",
            RuntimeValue::Int(_) => "int",
            RuntimeValue::Float(_) => "float",
            RuntimeValue::Str(_) => "str",
            RuntimeValue::List(_) => "list",
            RuntimeValue::Tuple(_) => "tuple",
            RuntimeValue::Dict(_) => "dict",
            RuntimeValue::Function(_) => "function",
            RuntimeValue::Native(_) | RuntimeValue::Builtin(_) => "builtin_function_or_method",
            RuntimeValue::Partial(_) => "functools.partial",
            RuntimeValue::BoundMethod(_) => "method",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::None => false,
            RuntimeValue::Bool(b) => *b,
            RuntimeValue::Int(n) => *n != 0,
            RuntimeValue::Float(f) => *f != 0.0,
            RuntimeValue::Str(s) => !s.is_empty(),
            RuntimeValue::List(items) => !items.borrow().is_empty(),
            RuntimeValue::Tuple(items) => !items.is_empty(),
            RuntimeValue::Dict(entries) => !entries.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RuntimeValue::None)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            RuntimeValue::Function(_)
                | RuntimeValue::Native(_)
                | RuntimeValue::Builtin(_)
                | RuntimeValue::Partial(_)
                | RuntimeValue::BoundMethod(_)
        )
    }

    pub fn is_hashable(&self) -> bool {
        match self {
            RuntimeValue::List(_) | RuntimeValue::Dict(_) => false,
            RuntimeValue::Tuple(items) => items.iter().all(RuntimeValue::is_hashable),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuntimeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of ints and bools.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RuntimeValue::Int(n) => Some(*n),
            RuntimeValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            RuntimeValue::Float(f) => Some(*f),
            other => other.as_int().map(|n| n as f64),
        }
    }

    /// Items produced by iterating the value, or `None` if it is not iterable.
    pub fn iter_values(&self) -> Option<Vec<RuntimeValue>> {
        match self {
            RuntimeValue::List(items) => Some(items.borrow().clone()),
            RuntimeValue::Tuple(items) => Some(items.to_vec()),
            RuntimeValue::Str(s) => Some(s.chars().map(|c| RuntimeValue::str(&c.to_string())).collect()),
            RuntimeValue::Dict(entries) => Some(entries.borrow().iter().map(|(k, _)| k.clone()).collect()),
            _ => None,
        }
    }

    /// Python `is`: identity for shared values, equality for immediates.
    pub fn is_same(&self, other: &RuntimeValue) -> bool {
        match (self, other) {
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a == b,
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Dict(a), RuntimeValue::Dict(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Native(a), RuntimeValue::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            (RuntimeValue::Builtin(a), RuntimeValue::Builtin(b)) => a == b,
            (RuntimeValue::Partial(a), RuntimeValue::Partial(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn repr(&self) -> String {
        match self {
            RuntimeValue::Str(s) => repr_str(s),
            other => other.to_string(),
        }
    }

    pub fn dict_get(&self, key: &RuntimeValue) -> Option<RuntimeValue> {
        match self {
            RuntimeValue::Dict(entries) => entries
                .borrow()
                .iter()
                .find_map(|(k, v)| (k == key).then(|| v.clone())),
            _ => None,
        }
    }

    pub fn dict_insert(entries: &Dict, key: RuntimeValue, value: RuntimeValue) {
        let mut entries = entries.borrow_mut();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::None, RuntimeValue::None) => true,
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => a == b,
            (RuntimeValue::Float(_), _) | (_, RuntimeValue::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (RuntimeValue::Int(_) | RuntimeValue::Bool(_), RuntimeValue::Int(_) | RuntimeValue::Bool(_)) => {
                self.as_int() == other.as_int()
            }
            (RuntimeValue::List(a), RuntimeValue::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => a == b,
            (RuntimeValue::Dict(a), RuntimeValue::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter().any(|(other_key, other_value)| key == other_key && value == other_value)
                    })
            }
            (RuntimeValue::Partial(a), RuntimeValue::Partial(b)) => {
                Rc::ptr_eq(a, b) || (a.func == b.func && a.bound == b.bound)
            }
            (RuntimeValue::BoundMethod(a), RuntimeValue::BoundMethod(b)) => {
                a.name == b.name && a.receiver.is_same(&b.receiver)
            }
            _ => self.is_same(other),
        }
    }
}

impl PartialOrd for RuntimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => a.partial_cmp(b),
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a.borrow().partial_cmp(&*b.borrow()),
            (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => a.partial_cmp(b),
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a.partial_cmp(b),
            _ => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Bool(b)
    }
}

impl From<i64> for RuntimeValue {
    fn from(n: i64) -> Self {
        RuntimeValue::Int(n)
    }
}

impl From<f64> for RuntimeValue {
    fn from(f: f64) -> Self {
        RuntimeValue::Float(f)
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::str(s)
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::Str(Rc::from(s))
    }
}

impl From<Vec<RuntimeValue>> for RuntimeValue {
    fn from(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::list(items)
    }
}

impl From<NativeFunction> for RuntimeValue {
    fn from(native: NativeFunction) -> Self {
        RuntimeValue::Native(native)
    }
}

impl Display for RuntimeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::None => write!(f, "None"),
            RuntimeValue::Bool(true) => write!(f, "True"),
            RuntimeValue::Bool(false) => write!(f, "False"),
            RuntimeValue::Int(n) => write!(f, "{}", n),
            RuntimeValue::Float(n) => write!(f, "{}", format_float(*n)),
            RuntimeValue::Str(s) => write!(f, "{}", s),
            RuntimeValue::List(items) => {
                write!(f, "[{}]", items.borrow().iter().map(RuntimeValue::repr).join(", "))
            }
            RuntimeValue::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            RuntimeValue::Tuple(items) => {
                write!(f, "({})", items.iter().map(RuntimeValue::repr).join(", "))
            }
            RuntimeValue::Dict(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .join(", ")
            ),
            RuntimeValue::Function(func) => write!(f, "<function {}>", func.name),
            RuntimeValue::Native(native) => write!(f, "<built-in function {}>", native.name),
            RuntimeValue::Builtin(name) => write!(f, "<built-in function {}>", name),
            RuntimeValue::Partial(partial) => {
                let args = partial
                    .bound
                    .positional
                    .iter()
                    .map(RuntimeValue::repr)
                    .chain(
                        partial
                            .bound
                            .keywords
                            .iter()
                            .map(|(name, value)| format!("{}={}", name, value.repr())),
                    )
                    .collect::<Vec<_>>();
                if args.is_empty() {
                    write!(f, "functools.partial({})", partial.func)
                } else {
                    write!(f, "functools.partial({}, {})", partial.func, args.join(", "))
                }
            }
            RuntimeValue::BoundMethod(method) => write!(
                f,
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            ),
        }
    }
}

impl Debug for RuntimeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::none(RuntimeValue::None, "None")]
    #[case::bool(RuntimeValue::Bool(true), "True")]
    #[case::float(RuntimeValue::Float(1.0), "1.0")]
    #[case::str(RuntimeValue::str("it's"), "\"it's\"")]
    #[case::list(RuntimeValue::list(vec![RuntimeValue::Int(1), "a".into()]), "[1, 'a']")]
    #[case::single_tuple(RuntimeValue::tuple(vec![RuntimeValue::Int(1)]), "(1,)")]
    #[case::dict(RuntimeValue::dict(vec![("k".into(), RuntimeValue::None)]), "{'k': None}")]
    fn test_repr(#[case] value: RuntimeValue, #[case] expected: &str) {
        assert_eq!(value.repr(), expected);
    }

    #[rstest]
    #[case::int_float(RuntimeValue::Int(1), RuntimeValue::Float(1.0), true)]
    #[case::bool_int(RuntimeValue::Bool(true), RuntimeValue::Int(1), true)]
    #[case::str_int(RuntimeValue::str("1"), RuntimeValue::Int(1), false)]
    #[case::tuples(
        RuntimeValue::tuple(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]),
        RuntimeValue::tuple(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]),
        true
    )]
    #[case::dict_order(
        RuntimeValue::dict(vec![("a".into(), RuntimeValue::Int(1)), ("b".into(), RuntimeValue::Int(2))]),
        RuntimeValue::dict(vec![("b".into(), RuntimeValue::Int(2)), ("a".into(), RuntimeValue::Int(1))]),
        true
    )]
    fn test_eq(#[case] a: RuntimeValue, #[case] b: RuntimeValue, #[case] expected: bool) {
        assert_eq!(a == b, expected);
    }

    #[rstest]
    #[case::empty_str(RuntimeValue::str(""), false)]
    #[case::zero(RuntimeValue::Int(0), false)]
    #[case::empty_list(RuntimeValue::list(Vec::new()), false)]
    #[case::tuple(RuntimeValue::tuple(vec![RuntimeValue::None]), true)]
    fn test_is_truthy(#[case] value: RuntimeValue, #[case] expected: bool) {
        assert_eq!(value.is_truthy(), expected);
    }

    #[test]
    fn test_list_identity() {
        let a = RuntimeValue::list(vec![RuntimeValue::Int(1)]);
        let b = RuntimeValue::list(vec![RuntimeValue::Int(1)]);
        assert!(a == b);
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn test_args_prepend() {
        let bound = Args::new(vec![RuntimeValue::Int(1)]).with_keyword("k", RuntimeValue::Int(2));
        let args = Args::new(vec![RuntimeValue::Int(3)]).with_keyword("k", RuntimeValue::Int(4));
        let merged = args.prepend(&bound);
        assert_eq!(merged.positional, vec![RuntimeValue::Int(1), RuntimeValue::Int(3)]);
        assert_eq!(merged.keyword("k"), Some(&RuntimeValue::Int(4)));
        assert_eq!(merged.keywords.len(), 1);
    }
}
