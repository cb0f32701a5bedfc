use std::{cmp::Ordering, rc::Rc, sync::LazyLock};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use super::{
    error::RuntimeError,
    runtime_value::{Args, Partial, RuntimeValue},
};
use crate::range::Range;

type FunctionName = String;
type ArgType = Vec<RuntimeValue>;

/// Builtins that need the evaluator's frame and are dispatched by it directly.
pub const INTRINSICS: [&str; 2] = ["print", "locals"];

#[derive(Clone, Debug)]
pub struct BuiltinFunction {
    pub num_params: ParamNum,
    pub func: fn(&str, &[RuntimeValue]) -> Result<RuntimeValue, Error>,
}

impl BuiltinFunction {
    pub fn new(
        num_params: ParamNum,
        func: fn(&str, &[RuntimeValue]) -> Result<RuntimeValue, Error>,
    ) -> Self {
        BuiltinFunction { num_params, func }
    }
}

#[derive(Clone, Debug)]
pub enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    #[inline(always)]
    pub fn is_valid(&self, num_args: u8) -> bool {
        match self {
            ParamNum::None => num_args == 0,
            ParamNum::Fixed(n) => num_args == *n,
            ParamNum::Range(min, max) => num_args >= *min && num_args <= *max,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ParamNum::None => "0".to_string(),
            ParamNum::Fixed(n) => n.to_string(),
            ParamNum::Range(min, u8::MAX) => format!("at least {}", min),
            ParamNum::Range(min, max) => format!("{} to {}", min, max),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("\"{0}\" is not defined")]
    NotDefined(FunctionName),
    #[error("Invalid types for \"{0}\", got {types}", types = .1.iter().map(RuntimeValue::type_name).join(", "))]
    InvalidTypes(FunctionName, ArgType),
    #[error("\"{0}\" takes {1} arguments, got {2}")]
    InvalidNumberOfArguments(FunctionName, String, usize),
    #[error("\"{0}\" does not accept keyword arguments")]
    UnexpectedKeyword(FunctionName),
    #[error("{0}")]
    InvalidValue(String),
    #[error("Index out of range")]
    IndexOutOfRange,
    #[error("Key {0} not found")]
    KeyNotFound(String),
    #[error("Division by zero")]
    ZeroDivision,
    #[error("Integer overflow")]
    Overflow,
}

impl Error {
    pub fn to_runtime_error(&self, range: Range) -> RuntimeError {
        match self {
            Error::NotDefined(name) => RuntimeError::NameError(range, name.clone()),
            Error::InvalidTypes(_, _)
            | Error::InvalidNumberOfArguments(_, _, _)
            | Error::UnexpectedKeyword(_) => RuntimeError::TypeError(range, self.to_string()),
            Error::InvalidValue(message) => RuntimeError::ValueError(range, message.clone()),
            Error::IndexOutOfRange => RuntimeError::IndexError(range),
            Error::KeyNotFound(key) => RuntimeError::KeyError(range, key.clone()),
            Error::ZeroDivision => RuntimeError::ZeroDivision(range),
            Error::Overflow => RuntimeError::Overflow(range),
        }
    }
}

fn invalid_types(name: &str, args: &[RuntimeValue]) -> Error {
    Error::InvalidTypes(name.to_string(), args.to_vec())
}

fn iterate(name: &str, value: &RuntimeValue) -> Result<Vec<RuntimeValue>, Error> {
    value
        .iter_values()
        .ok_or_else(|| invalid_types(name, std::slice::from_ref(value)))
}

fn compare(name: &str, a: &RuntimeValue, b: &RuntimeValue) -> Result<Ordering, Error> {
    a.partial_cmp(b)
        .ok_or_else(|| invalid_types(name, &[a.clone(), b.clone()]))
}

pub fn add(name: &str, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, Error> {
    match (a, b) {
        (RuntimeValue::Str(a), RuntimeValue::Str(b)) => Ok(format!("{}{}", a, b).into()),
        (RuntimeValue::List(a), RuntimeValue::List(b)) => Ok(RuntimeValue::list(
            a.borrow().iter().chain(b.borrow().iter()).cloned().collect(),
        )),
        (RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => {
            Ok(RuntimeValue::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (RuntimeValue::Float(_), _) | (_, RuntimeValue::Float(_)) => {
            match (a.as_float(), b.as_float()) {
                (Some(a), Some(b)) => Ok(RuntimeValue::Float(a + b)),
                _ => Err(invalid_types(name, &[a.clone(), b.clone()])),
            }
        }
        _ => match (a.as_int(), b.as_int()) {
            (Some(a), Some(b)) => a.checked_add(b).map(RuntimeValue::Int).ok_or(Error::Overflow),
            _ => Err(invalid_types(name, &[a.clone(), b.clone()])),
        },
    }
}

fn extremum(name: &str, args: &[RuntimeValue], wanted: Ordering) -> Result<RuntimeValue, Error> {
    let items = match args {
        [single] => iterate(name, single)?,
        _ => args.to_vec(),
    };

    let mut items = items.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| Error::InvalidValue(format!("{}() arg is an empty sequence", name)))?;
    for item in items {
        if compare(name, &item, &best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn to_int(name: &str, value: &RuntimeValue) -> Result<RuntimeValue, Error> {
    match value {
        RuntimeValue::Int(_) | RuntimeValue::Bool(_) => Ok(RuntimeValue::Int(value.as_int().unwrap_or_default())),
        RuntimeValue::Float(f) if f.is_finite() => Ok(RuntimeValue::Int(f.trunc() as i64)),
        RuntimeValue::Float(_) => Err(Error::InvalidValue("cannot convert float to integer".to_string())),
        RuntimeValue::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(RuntimeValue::Int)
            .map_err(|_| Error::InvalidValue(format!("invalid literal for int(): {}", value.repr()))),
        _ => Err(invalid_types(name, std::slice::from_ref(value))),
    }
}

fn to_float(name: &str, value: &RuntimeValue) -> Result<RuntimeValue, Error> {
    match value {
        RuntimeValue::Str(s) => {
            let text = s.trim().to_lowercase();
            match text.as_str() {
                "inf" | "+inf" | "infinity" => Ok(RuntimeValue::Float(f64::INFINITY)),
                "-inf" | "-infinity" => Ok(RuntimeValue::Float(f64::NEG_INFINITY)),
                "nan" => Ok(RuntimeValue::Float(f64::NAN)),
                _ => text.parse::<f64>().map(RuntimeValue::Float).map_err(|_| {
                    Error::InvalidValue(format!("could not convert string to float: {}", value.repr()))
                }),
            }
        }
        other => other
            .as_float()
            .map(RuntimeValue::Float)
            .ok_or_else(|| invalid_types(name, std::slice::from_ref(value))),
    }
}

fn index_of(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

pub static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<SmolStr, BuiltinFunction>> =
    LazyLock::new(|| {
        let mut map = FxHashMap::default();

        map.insert(
            SmolStr::new("len"),
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| match args {
                [RuntimeValue::Str(s)] => Ok(RuntimeValue::Int(s.chars().count() as i64)),
                [RuntimeValue::List(items)] => Ok(RuntimeValue::Int(items.borrow().len() as i64)),
                [RuntimeValue::Tuple(items)] => Ok(RuntimeValue::Int(items.len() as i64)),
                [RuntimeValue::Dict(entries)] => Ok(RuntimeValue::Int(entries.borrow().len() as i64)),
                _ => Err(invalid_types(name, args)),
            }),
        );
        map.insert(
            SmolStr::new("range"),
            BuiltinFunction::new(ParamNum::Range(1, 3), |name, args| {
                let ints = args
                    .iter()
                    .map(|arg| arg.as_int().ok_or_else(|| invalid_types(name, args)))
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(invalid_types(name, args)),
                };
                if step == 0 {
                    return Err(Error::InvalidValue("range() arg 3 must not be zero".to_string()));
                }

                let mut values = Vec::new();
                let mut current = start;
                while (step > 0 && current < stop) || (step < 0 && current > stop) {
                    values.push(RuntimeValue::Int(current));
                    current = match current.checked_add(step) {
                        Some(next) => next,
                        None => break,
                    };
                }
                Ok(RuntimeValue::list(values))
            }),
        );
        map.insert(
            SmolStr::new("enumerate"),
            BuiltinFunction::new(ParamNum::Range(1, 2), |name, args| {
                let start = match args.get(1) {
                    Some(start) => start.as_int().ok_or_else(|| invalid_types(name, args))?,
                    None => 0,
                };
                let items = iterate(name, &args[0])?;
                Ok(RuntimeValue::list(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| RuntimeValue::tuple(vec![RuntimeValue::Int(start + i as i64), item]))
                        .collect(),
                ))
            }),
        );
        map.insert(
            SmolStr::new("zip"),
            BuiltinFunction::new(ParamNum::Range(0, u8::MAX), |name, args| {
                let columns = args
                    .iter()
                    .map(|arg| iterate(name, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(RuntimeValue::list(
                    (0..len)
                        .map(|row| RuntimeValue::tuple(columns.iter().map(|column| column[row].clone()).collect()))
                        .collect(),
                ))
            }),
        );
        map.insert(
            SmolStr::new("str"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |_, args| match args {
                [value] => Ok(value.to_string().into()),
                _ => Ok(RuntimeValue::str("")),
            }),
        );
        map.insert(
            SmolStr::new("repr"),
            BuiltinFunction::new(ParamNum::Fixed(1), |_, args| Ok(args[0].repr().into())),
        );
        map.insert(
            SmolStr::new("int"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |name, args| match args {
                [value] => to_int(name, value),
                _ => Ok(RuntimeValue::Int(0)),
            }),
        );
        map.insert(
            SmolStr::new("float"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |name, args| match args {
                [value] => to_float(name, value),
                _ => Ok(RuntimeValue::Float(0.0)),
            }),
        );
        map.insert(
            SmolStr::new("bool"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |_, args| {
                Ok(RuntimeValue::Bool(args.first().is_some_and(RuntimeValue::is_truthy)))
            }),
        );
        map.insert(
            SmolStr::new("list"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |name, args| match args {
                [value] => Ok(RuntimeValue::list(iterate(name, value)?)),
                _ => Ok(RuntimeValue::list(Vec::new())),
            }),
        );
        map.insert(
            SmolStr::new("tuple"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |name, args| match args {
                [value] => Ok(RuntimeValue::tuple(iterate(name, value)?)),
                _ => Ok(RuntimeValue::tuple(Vec::new())),
            }),
        );
        map.insert(
            SmolStr::new("dict"),
            BuiltinFunction::new(ParamNum::Range(0, 1), |name, args| {
                let entries = match args {
                    [RuntimeValue::Dict(entries)] => entries.borrow().clone(),
                    [value] => iterate(name, value)?
                        .into_iter()
                        .map(|pair| match pair.iter_values().as_deref() {
                            Some([key, value]) => Ok((key.clone(), value.clone())),
                            _ => Err(Error::InvalidValue(
                                "dictionary update sequence element must have length 2".to_string(),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                let dict = RuntimeValue::dict(Vec::new());
                if let RuntimeValue::Dict(target) = &dict {
                    for (key, value) in entries {
                        RuntimeValue::dict_insert(target, key, value);
                    }
                }
                Ok(dict)
            }),
        );
        map.insert(
            SmolStr::new("sorted"),
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| {
                let mut items = iterate(name, &args[0])?;
                let mut failed = None;
                items.sort_by(|a, b| {
                    a.partial_cmp(b).unwrap_or_else(|| {
                        failed.get_or_insert_with(|| vec![a.clone(), b.clone()]);
                        Ordering::Equal
                    })
                });
                match failed {
                    Some(pair) => Err(Error::InvalidTypes(name.to_string(), pair)),
                    None => Ok(RuntimeValue::list(items)),
                }
            }),
        );
        map.insert(
            SmolStr::new("min"),
            BuiltinFunction::new(ParamNum::Range(1, u8::MAX), |name, args| {
                extremum(name, args, Ordering::Less)
            }),
        );
        map.insert(
            SmolStr::new("max"),
            BuiltinFunction::new(ParamNum::Range(1, u8::MAX), |name, args| {
                extremum(name, args, Ordering::Greater)
            }),
        );
        map.insert(
            SmolStr::new("sum"),
            BuiltinFunction::new(ParamNum::Range(1, 2), |name, args| {
                let start = args.get(1).cloned().unwrap_or(RuntimeValue::Int(0));
                iterate(name, &args[0])?
                    .iter()
                    .try_fold(start, |total, item| add(name, &total, item))
            }),
        );
        map.insert(
            SmolStr::new("abs"),
            BuiltinFunction::new(ParamNum::Fixed(1), |name, args| match &args[0] {
                RuntimeValue::Float(f) => Ok(RuntimeValue::Float(f.abs())),
                value => value
                    .as_int()
                    .ok_or_else(|| invalid_types(name, args))?
                    .checked_abs()
                    .map(RuntimeValue::Int)
                    .ok_or(Error::Overflow),
            }),
        );
        map.insert(
            SmolStr::new("partial"),
            BuiltinFunction::new(ParamNum::Range(1, u8::MAX), |name, args| match args {
                [func, bound @ ..] if func.is_callable() => Ok(RuntimeValue::Partial(Rc::new(Partial {
                    func: func.clone(),
                    bound: Args::new(bound.to_vec()),
                }))),
                _ => Err(invalid_types(name, args)),
            }),
        );

        map
    });

pub fn is_builtin(name: &str) -> bool {
    INTRINSICS.contains(&name) || BUILTIN_FUNCTIONS.contains_key(name)
}

pub fn eval_builtin(name: &str, args: &Args) -> Result<RuntimeValue, Error> {
    BUILTIN_FUNCTIONS.get(name).map_or_else(
        || Err(Error::NotDefined(name.to_string())),
        |f| {
            if !args.keywords.is_empty() {
                return Err(Error::UnexpectedKeyword(name.to_string()));
            }
            let num_args = args.positional.len();
            if !f.num_params.is_valid(u8::try_from(num_args).unwrap_or(u8::MAX)) {
                return Err(Error::InvalidNumberOfArguments(
                    name.to_string(),
                    f.num_params.describe(),
                    num_args,
                ));
            }
            (f.func)(name, &args.positional)
        },
    )
}

pub fn has_method(receiver: &RuntimeValue, name: &str) -> bool {
    let methods: &[&str] = match receiver {
        RuntimeValue::Str(_) => &[
            "join",
            "split",
            "strip",
            "upper",
            "lower",
            "replace",
            "startswith",
            "endswith",
        ],
        RuntimeValue::List(_) => &["append", "extend", "pop", "insert"],
        RuntimeValue::Dict(_) => &["items", "keys", "values", "get"],
        _ => &[],
    };
    methods.contains(&name)
}

/// Calls a method of a builtin type.
pub fn call_method(receiver: &RuntimeValue, name: &str, args: &Args) -> Result<RuntimeValue, Error> {
    if !args.keywords.is_empty() {
        return Err(Error::UnexpectedKeyword(name.to_string()));
    }
    let arity = |expected: ParamNum| {
        if expected.is_valid(u8::try_from(args.positional.len()).unwrap_or(u8::MAX)) {
            Ok(())
        } else {
            Err(Error::InvalidNumberOfArguments(
                name.to_string(),
                expected.describe(),
                args.positional.len(),
            ))
        }
    };
    let args = args.positional.as_slice();

    match (receiver, name) {
        (RuntimeValue::Str(s), "join") => {
            arity(ParamNum::Fixed(1))?;
            let parts = iterate(name, &args[0])?
                .iter()
                .map(|part| part.as_str().map(str::to_string).ok_or_else(|| invalid_types(name, args)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(&**s).into())
        }
        (RuntimeValue::Str(s), "split") => {
            arity(ParamNum::Range(0, 1))?;
            let parts = match args {
                [] | [RuntimeValue::None] => s.split_whitespace().map(RuntimeValue::str).collect(),
                [RuntimeValue::Str(sep)] if sep.is_empty() => {
                    return Err(Error::InvalidValue("empty separator".to_string()));
                }
                [RuntimeValue::Str(sep)] => s.split(&**sep).map(RuntimeValue::str).collect(),
                _ => return Err(invalid_types(name, args)),
            };
            Ok(RuntimeValue::list(parts))
        }
        (RuntimeValue::Str(s), "strip") => {
            arity(ParamNum::Range(0, 1))?;
            match args {
                [] | [RuntimeValue::None] => Ok(RuntimeValue::str(s.trim())),
                [RuntimeValue::Str(chars)] => Ok(RuntimeValue::str(s.trim_matches(|c: char| chars.contains(c)))),
                _ => Err(invalid_types(name, args)),
            }
        }
        (RuntimeValue::Str(s), "upper") => {
            arity(ParamNum::None)?;
            Ok(s.to_uppercase().into())
        }
        (RuntimeValue::Str(s), "lower") => {
            arity(ParamNum::None)?;
            Ok(s.to_lowercase().into())
        }
        (RuntimeValue::Str(s), "replace") => {
            arity(ParamNum::Fixed(2))?;
            match args {
                [RuntimeValue::Str(from), RuntimeValue::Str(to)] => Ok(s.replace(&**from, to).into()),
                _ => Err(invalid_types(name, args)),
            }
        }
        (RuntimeValue::Str(s), "startswith" | "endswith") => {
            arity(ParamNum::Fixed(1))?;
            match args {
                [RuntimeValue::Str(affix)] if name == "startswith" => Ok(s.starts_with(&**affix).into()),
                [RuntimeValue::Str(affix)] => Ok(s.ends_with(&**affix).into()),
                _ => Err(invalid_types(name, args)),
            }
        }
        (RuntimeValue::List(items), "append") => {
            arity(ParamNum::Fixed(1))?;
            items.borrow_mut().push(args[0].clone());
            Ok(RuntimeValue::None)
        }
        (RuntimeValue::List(items), "extend") => {
            arity(ParamNum::Fixed(1))?;
            let extra = iterate(name, &args[0])?;
            items.borrow_mut().extend(extra);
            Ok(RuntimeValue::None)
        }
        (RuntimeValue::List(items), "pop") => {
            arity(ParamNum::Range(0, 1))?;
            let index = match args.first() {
                Some(index) => index.as_int().ok_or_else(|| invalid_types(name, args))?,
                None => -1,
            };
            let mut items = items.borrow_mut();
            let index = index_of(items.len(), index).ok_or(Error::IndexOutOfRange)?;
            Ok(items.remove(index))
        }
        (RuntimeValue::List(items), "insert") => {
            arity(ParamNum::Fixed(2))?;
            let index = args[0].as_int().ok_or_else(|| invalid_types(name, args))?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, args[1].clone());
            Ok(RuntimeValue::None)
        }
        (RuntimeValue::Dict(entries), "items") => {
            arity(ParamNum::None)?;
            Ok(RuntimeValue::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| RuntimeValue::tuple(vec![key.clone(), value.clone()]))
                    .collect(),
            ))
        }
        (RuntimeValue::Dict(entries), "keys") => {
            arity(ParamNum::None)?;
            Ok(RuntimeValue::list(entries.borrow().iter().map(|(key, _)| key.clone()).collect()))
        }
        (RuntimeValue::Dict(entries), "values") => {
            arity(ParamNum::None)?;
            Ok(RuntimeValue::list(entries.borrow().iter().map(|(_, value)| value.clone()).collect()))
        }
        (RuntimeValue::Dict(_), "get") => {
            arity(ParamNum::Range(1, 2))?;
            Ok(receiver
                .dict_get(&args[0])
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or_default()))
        }
        _ => Err(Error::NotDefined(format!("{}.{}", receiver.type_name(), name))),
    }
}

/// Resolves a possibly negative index into a sequence of `len` items.
pub fn resolve_index(len: usize, index: i64) -> Result<usize, Error> {
    index_of(len, index).ok_or(Error::IndexOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ints(values: &[i64]) -> RuntimeValue {
        RuntimeValue::list(values.iter().map(|n| RuntimeValue::Int(*n)).collect())
    }

    #[rstest]
    #[case::len_str("len", vec![RuntimeValue::str("héllo")], RuntimeValue::Int(5))]
    #[case::range_stop("range", vec![RuntimeValue::Int(3)], ints(&[0, 1, 2]))]
    #[case::range_step("range", vec![RuntimeValue::Int(5), RuntimeValue::Int(0), RuntimeValue::Int(-2)], ints(&[5, 3, 1]))]
    #[case::sorted("sorted", vec![ints(&[3, 1, 2])], ints(&[1, 2, 3]))]
    #[case::min_args("min", vec![RuntimeValue::Int(3), RuntimeValue::Int(1)], RuntimeValue::Int(1))]
    #[case::max_iter("max", vec![ints(&[3, 7, 2])], RuntimeValue::Int(7))]
    #[case::sum("sum", vec![ints(&[1, 2, 3])], RuntimeValue::Int(6))]
    #[case::sum_float("sum", vec![ints(&[1]), RuntimeValue::Float(0.5)], RuntimeValue::Float(1.5))]
    #[case::int_str("int", vec![RuntimeValue::str(" 42 ")], RuntimeValue::Int(42))]
    #[case::int_float("int", vec![RuntimeValue::Float(-2.7)], RuntimeValue::Int(-2))]
    #[case::float_str("float", vec![RuntimeValue::str("1.5")], RuntimeValue::Float(1.5))]
    #[case::str_float("str", vec![RuntimeValue::Float(2.0)], RuntimeValue::str("2.0"))]
    #[case::repr_str("repr", vec![RuntimeValue::str("a")], RuntimeValue::str("'a'"))]
    #[case::bool_empty("bool", vec![RuntimeValue::list(Vec::new())], RuntimeValue::Bool(false))]
    #[case::abs("abs", vec![RuntimeValue::Int(-4)], RuntimeValue::Int(4))]
    #[case::enumerate(
        "enumerate",
        vec![RuntimeValue::str("ab")],
        RuntimeValue::list(vec![
            RuntimeValue::tuple(vec![RuntimeValue::Int(0), RuntimeValue::str("a")]),
            RuntimeValue::tuple(vec![RuntimeValue::Int(1), RuntimeValue::str("b")]),
        ])
    )]
    #[case::zip(
        "zip",
        vec![ints(&[1, 2, 3]), RuntimeValue::str("ab")],
        RuntimeValue::list(vec![
            RuntimeValue::tuple(vec![RuntimeValue::Int(1), RuntimeValue::str("a")]),
            RuntimeValue::tuple(vec![RuntimeValue::Int(2), RuntimeValue::str("b")]),
        ])
    )]
    fn test_eval_builtin(#[case] name: &str, #[case] args: Vec<RuntimeValue>, #[case] expected: RuntimeValue) {
        assert_eq!(eval_builtin(name, &Args::new(args)).unwrap(), expected);
    }

    #[rstest]
    #[case::len_int("len", vec![RuntimeValue::Int(1)])]
    #[case::arity("len", vec![])]
    #[case::range_zero_step("range", vec![RuntimeValue::Int(0), RuntimeValue::Int(1), RuntimeValue::Int(0)])]
    #[case::max_empty("max", vec![ints(&[])])]
    #[case::sorted_mixed("sorted", vec![RuntimeValue::list(vec![RuntimeValue::Int(1), RuntimeValue::str("a")])])]
    #[case::int_invalid("int", vec![RuntimeValue::str("x")])]
    #[case::unknown("nope", vec![])]
    fn test_eval_builtin_error(#[case] name: &str, #[case] args: Vec<RuntimeValue>) {
        assert!(eval_builtin(name, &Args::new(args)).is_err());
    }

    #[rstest]
    #[case::join(RuntimeValue::str(", "), "join", vec![RuntimeValue::list(vec!["a".into(), "b".into()])], RuntimeValue::str("a, b"))]
    #[case::split_ws(RuntimeValue::str(" a  b "), "split", vec![], RuntimeValue::list(vec!["a".into(), "b".into()]))]
    #[case::split_sep(RuntimeValue::str("a,b"), "split", vec![",".into()], RuntimeValue::list(vec!["a".into(), "b".into()]))]
    #[case::strip(RuntimeValue::str("  x "), "strip", vec![], RuntimeValue::str("x"))]
    #[case::upper(RuntimeValue::str("ab"), "upper", vec![], RuntimeValue::str("AB"))]
    #[case::replace(RuntimeValue::str("aXa"), "replace", vec!["a".into(), "b".into()], RuntimeValue::str("bXb"))]
    #[case::startswith(RuntimeValue::str("abc"), "startswith", vec!["ab".into()], RuntimeValue::Bool(true))]
    #[case::dict_get_default(RuntimeValue::dict(Vec::new()), "get", vec!["k".into(), RuntimeValue::Int(1)], RuntimeValue::Int(1))]
    fn test_call_method(
        #[case] receiver: RuntimeValue,
        #[case] name: &str,
        #[case] args: Vec<RuntimeValue>,
        #[case] expected: RuntimeValue,
    ) {
        assert_eq!(call_method(&receiver, name, &Args::new(args)).unwrap(), expected);
    }

    #[test]
    fn test_list_methods_mutate_in_place() {
        let list = ints(&[1, 2]);
        call_method(&list, "append", &Args::new(vec![RuntimeValue::Int(3)])).unwrap();
        call_method(&list, "insert", &Args::new(vec![RuntimeValue::Int(0), RuntimeValue::Int(0)])).unwrap();
        let popped = call_method(&list, "pop", &Args::default()).unwrap();

        assert_eq!(popped, RuntimeValue::Int(3));
        assert_eq!(list, ints(&[0, 1, 2]));
    }

    #[test]
    fn test_partial_binds_arguments() {
        let partial = eval_builtin(
            "partial",
            &Args::new(vec![RuntimeValue::Builtin(SmolStr::new("max")), RuntimeValue::Int(5)]),
        )
        .unwrap();

        match partial {
            RuntimeValue::Partial(partial) => {
                assert_eq!(partial.bound.positional, vec![RuntimeValue::Int(5)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
