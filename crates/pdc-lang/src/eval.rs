// Tree-walking evaluator for the host language.
// Statements run against a frame holding the current scope; functions resolve
// free names against the globals of the namespace that defined them.
use std::{cell::RefCell, rc::Rc};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    ast::node::{Arg, BinaryOp, BoolOp, Block, CmpOp, Expr, ExprKind, Literal, NodeId, NodeKind, ParamKind, Tree, UnaryOp},
    namespace::NamespaceInner,
    range::Range,
};

pub mod builtin;
pub mod env;
pub mod error;
pub mod runtime_value;

use env::Env;
use error::RuntimeError;
use runtime_value::{Args, BoundMethod, Function, FunctionParam, RuntimeValue};

/// Configuration options for the evaluator.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum depth of nested function calls.
    pub max_call_depth: u32,
    /// Also write `print` output to stdout, not only to the namespace buffer.
    pub echo_print: bool,
}

#[cfg(debug_assertions)]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            echo_print: false,
        }
    }
}

#[cfg(not(debug_assertions))]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            echo_print: false,
        }
    }
}

enum Flow {
    Normal,
    Return(RuntimeValue),
    Break,
    Continue,
}

/// The code currently executing: its tree and the text it was parsed from.
#[derive(Clone, Copy)]
struct Code<'a> {
    tree: &'a Rc<Tree>,
    source: &'a Rc<str>,
}

struct Frame {
    env: Rc<RefCell<Env>>,
    namespace: Rc<NamespaceInner>,
    /// Collected values when running a generator body.
    yields: Option<Vec<RuntimeValue>>,
    in_function: bool,
    loop_depth: usize,
}

impl Frame {
    fn scope(&self) -> Frame {
        Frame {
            env: Env::with_parent(Rc::downgrade(&self.env)).shared(),
            namespace: Rc::clone(&self.namespace),
            yields: None,
            in_function: self.in_function,
            loop_depth: 0,
        }
    }
}

enum Numbers {
    Int(i64, i64),
    Float(f64, f64),
}

impl Numbers {
    fn of(a: &RuntimeValue, b: &RuntimeValue) -> Option<Numbers> {
        match (a, b) {
            (RuntimeValue::Float(_), _) | (_, RuntimeValue::Float(_)) => {
                Some(Numbers::Float(a.as_float()?, b.as_float()?))
            }
            _ => Some(Numbers::Int(a.as_int()?, b.as_int()?)),
        }
    }
}

pub(crate) struct Evaluator {
    /// Namespace receiving `print` output.
    namespace: Rc<NamespaceInner>,
    call_depth: u32,
}

impl Evaluator {
    pub(crate) fn new(namespace: Rc<NamespaceInner>) -> Self {
        Self {
            namespace,
            call_depth: 0,
        }
    }

    /// Runs top-level code with the namespace globals as the current scope.
    pub(crate) fn exec_module(&mut self, tree: Rc<Tree>, source: Rc<str>) -> Result<(), RuntimeError> {
        let mut frame = Frame {
            env: Rc::clone(&self.namespace.globals),
            namespace: Rc::clone(&self.namespace),
            yields: None,
            in_function: false,
            loop_depth: 0,
        };
        let code = Code {
            tree: &tree,
            source: &source,
        };

        self.exec_block(code, &tree.body, &mut frame).map(|_| ())
    }

    pub(crate) fn call(&mut self, callee: &RuntimeValue, args: Args, range: Range) -> Result<RuntimeValue, RuntimeError> {
        match callee {
            RuntimeValue::Function(func) => self.call_function(func, args, range),
            RuntimeValue::Native(native) => (native.func)(&args),
            RuntimeValue::Builtin(name) if name == "print" => self.print(args, range),
            RuntimeValue::Builtin(name) if name == "locals" => {
                Ok(locals_dict(self.namespace.globals.borrow().locals()))
            }
            RuntimeValue::Builtin(name) => {
                builtin::eval_builtin(name, &args).map_err(|e| e.to_runtime_error(range))
            }
            RuntimeValue::Partial(partial) => self.call(&partial.func, args.prepend(&partial.bound), range),
            RuntimeValue::BoundMethod(method) => {
                builtin::call_method(&method.receiver, &method.name, &args).map_err(|e| e.to_runtime_error(range))
            }
            other => Err(RuntimeError::TypeError(
                range,
                format!("\"{}\" object is not callable", other.type_name()),
            )),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Args, range: Range) -> Result<RuntimeValue, RuntimeError> {
        let max_call_depth = self.namespace.options.max_call_depth;
        if self.call_depth >= max_call_depth {
            return Err(RuntimeError::RecursionError(max_call_depth));
        }

        let namespace = func.namespace.upgrade().ok_or_else(|| {
            RuntimeError::Native(format!("namespace of function \"{}\" no longer exists", func.name))
        })?;
        let env = Env::with_parent(Rc::downgrade(&namespace.globals)).shared();
        bind_params(func, args, &env, range)?;

        let mut frame = Frame {
            env,
            namespace,
            yields: func.is_generator.then(Vec::new),
            in_function: true,
            loop_depth: 0,
        };
        let code = Code {
            tree: &func.tree,
            source: &func.source,
        };

        self.call_depth += 1;
        let flow = self.exec_block(code, &func.body, &mut frame);
        self.call_depth -= 1;

        match (flow?, frame.yields) {
            (_, Some(yields)) => Ok(RuntimeValue::list(yields)),
            (Flow::Return(value), None) => Ok(value),
            (_, None) => Ok(RuntimeValue::None),
        }
    }

    fn print(&mut self, args: Args, range: Range) -> Result<RuntimeValue, RuntimeError> {
        let text_of = |name: &str, default: &str| match args.keyword(name) {
            None | Some(RuntimeValue::None) => Ok(default.to_string()),
            Some(RuntimeValue::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(RuntimeError::TypeError(
                range,
                format!("{} must be None or a string, not {}", name, other.type_name()),
            )),
        };
        if let Some((name, _)) = args.keywords.iter().find(|(name, _)| name != "sep" && name != "end") {
            return Err(RuntimeError::TypeError(
                range,
                format!("\"{}\" is an invalid keyword argument for print()", name),
            ));
        }

        let sep = text_of("sep", " ")?;
        let end = text_of("end", "\n")?;
        let text = format!("{}{}", args.positional.iter().join(&sep), end);

        if self.namespace.options.echo_print {
            print!("{}", text);
        }
        self.namespace.output.borrow_mut().push_str(&text);
        Ok(RuntimeValue::None)
    }

    fn exec_block(&mut self, code: Code, block: &Block, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        for id in block {
            match self.exec_stmt(code, *id, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, code: Code, id: NodeId, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        let node = &code.tree[id];
        let range = node.range;

        match &node.kind {
            NodeKind::Expr(expr) => {
                self.eval_expr(code, expr, frame)?;
            }
            NodeKind::Assign { targets, value } => {
                let value = self.eval_expr(code, value, frame)?;
                for target in targets {
                    self.assign(code, target, value.clone(), frame)?;
                }
            }
            NodeKind::AugAssign { target, op, value } => {
                let current = self.eval_expr(code, target, frame)?;
                let operand = self.eval_expr(code, value, frame)?;

                if let (BinaryOp::Add, RuntimeValue::List(items)) = (op, &current) {
                    let extra = operand.iter_values().ok_or_else(|| not_iterable(&operand, range))?;
                    items.borrow_mut().extend(extra);
                } else {
                    let result = binary_op(*op, &current, &operand, range)?;
                    self.assign(code, target, result, frame)?;
                }
            }
            NodeKind::Return(value) => {
                if !frame.in_function {
                    return Err(RuntimeError::OutsideFunction(range, "return"));
                }
                let value = match value {
                    Some(value) => self.eval_expr(code, value, frame)?,
                    None => RuntimeValue::None,
                };
                return Ok(Flow::Return(value));
            }
            NodeKind::Yield(value) => {
                let value = match value {
                    Some(value) => self.eval_expr(code, value, frame)?,
                    None => RuntimeValue::None,
                };
                frame
                    .yields
                    .as_mut()
                    .ok_or(RuntimeError::OutsideFunction(range, "yield"))?
                    .push(value);
            }
            NodeKind::Pass | NodeKind::Comment(_) => {}
            NodeKind::Break if frame.loop_depth == 0 => return Err(RuntimeError::OutsideLoop(range, "break")),
            NodeKind::Break => return Ok(Flow::Break),
            NodeKind::Continue if frame.loop_depth == 0 => {
                return Err(RuntimeError::OutsideLoop(range, "continue"));
            }
            NodeKind::Continue => return Ok(Flow::Continue),
            NodeKind::If { test, body, orelse, .. } => {
                let branch = if self.eval_expr(code, test, frame)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(code, branch, frame);
            }
            NodeKind::For { target, iter, body } => {
                let iterable = self.eval_expr(code, iter, frame)?;
                let items = iterable.iter_values().ok_or_else(|| not_iterable(&iterable, iter.range))?;

                frame.loop_depth += 1;
                let flow = self.exec_for(code, target, items, body, frame);
                frame.loop_depth -= 1;

                if let Flow::Return(value) = flow? {
                    return Ok(Flow::Return(value));
                }
            }
            NodeKind::While { test, body } => {
                frame.loop_depth += 1;
                let flow = self.exec_while(code, test, body, frame);
                frame.loop_depth -= 1;

                if let Flow::Return(value) = flow? {
                    return Ok(Flow::Return(value));
                }
            }
            NodeKind::Def { name, params, body } => {
                let params = params
                    .iter()
                    .map(|param| -> Result<FunctionParam, RuntimeError> {
                        let default = match &param.default {
                            Some(default) => Some(self.eval_expr(code, default, frame)?),
                            None => None,
                        };
                        Ok(FunctionParam {
                            name: param.name.clone(),
                            default,
                            kind: param.kind,
                        })
                    })
                    .collect::<Result<Vec<_>, RuntimeError>>()?;

                let function = Function {
                    name: name.clone(),
                    params,
                    range,
                    is_generator: body.iter().any(|id| code.tree[*id].kind.contains_yield(code.tree)),
                    body: body.clone(),
                    tree: Rc::clone(code.tree),
                    namespace: Rc::downgrade(&frame.namespace),
                    source: Rc::clone(code.source),
                };
                frame
                    .env
                    .borrow_mut()
                    .define(name.clone(), RuntimeValue::Function(Rc::new(function)));
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_for(
        &mut self,
        code: Code,
        target: &Expr,
        items: Vec<RuntimeValue>,
        body: &Block,
        frame: &mut Frame,
    ) -> Result<Flow, RuntimeError> {
        for item in items {
            self.assign(code, target, item, frame)?;
            match self.exec_block(code, body, frame)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_while(&mut self, code: Code, test: &Expr, body: &Block, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        while self.eval_expr(code, test, frame)?.is_truthy() {
            match self.exec_block(code, body, frame)? {
                Flow::Break => break,
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, code: Code, target: &Expr, value: RuntimeValue, frame: &mut Frame) -> Result<(), RuntimeError> {
        match &target.kind {
            ExprKind::Name(name) => {
                frame.env.borrow_mut().define(name.clone(), value);
                Ok(())
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let values = value.iter_values().ok_or_else(|| {
                    RuntimeError::TypeError(
                        target.range,
                        format!("cannot unpack non-iterable {} object", value.type_name()),
                    )
                })?;
                if values.len() != targets.len() {
                    let message = if values.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            values.len()
                        )
                    };
                    return Err(RuntimeError::ValueError(target.range, message));
                }

                targets
                    .iter()
                    .zip(values)
                    .try_for_each(|(target, value)| self.assign(code, target, value, frame))
            }
            ExprKind::Subscript { value: container, index } => {
                let container = self.eval_expr(code, container, frame)?;
                let index = self.eval_expr(code, index, frame)?;

                match &container {
                    RuntimeValue::List(items) => {
                        let position = index.as_int().ok_or_else(|| {
                            RuntimeError::TypeError(
                                target.range,
                                format!("list indices must be integers, not {}", index.type_name()),
                            )
                        })?;
                        let mut items = items.borrow_mut();
                        let position = builtin::resolve_index(items.len(), position)
                            .map_err(|e| e.to_runtime_error(target.range))?;
                        items[position] = value;
                        Ok(())
                    }
                    RuntimeValue::Dict(entries) => {
                        check_hashable(&index, target.range)?;
                        RuntimeValue::dict_insert(entries, index, value);
                        Ok(())
                    }
                    other => Err(RuntimeError::TypeError(
                        target.range,
                        format!("\"{}\" object does not support item assignment", other.type_name()),
                    )),
                }
            }
            _ => Err(RuntimeError::TypeError(
                target.range,
                "cannot assign to expression".to_string(),
            )),
        }
    }

    fn eval_expr(&mut self, code: Code, expr: &Expr, frame: &mut Frame) -> Result<RuntimeValue, RuntimeError> {
        let range = expr.range;

        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::None => RuntimeValue::None,
                Literal::Bool(b) => RuntimeValue::Bool(*b),
                Literal::Int(n) => RuntimeValue::Int(*n),
                Literal::Float(f) => RuntimeValue::Float(*f),
                Literal::Str(s) => RuntimeValue::str(s),
            }),
            ExprKind::Name(name) => frame
                .env
                .borrow()
                .resolve(name)
                .map_err(|e| e.to_runtime_error(range)),
            ExprKind::Tuple(items) => Ok(RuntimeValue::tuple(self.eval_all(code, items, frame)?)),
            ExprKind::List(items) => Ok(RuntimeValue::list(self.eval_all(code, items, frame)?)),
            ExprKind::Dict(entries) => {
                let dict = RuntimeValue::dict(Vec::with_capacity(entries.len()));
                if let RuntimeValue::Dict(target) = &dict {
                    for (key, value) in entries {
                        let key_range = key.range;
                        let key = self.eval_expr(code, key, frame)?;
                        check_hashable(&key, key_range)?;
                        let value = self.eval_expr(code, value, frame)?;
                        RuntimeValue::dict_insert(target, key, value);
                    }
                }
                Ok(dict)
            }
            ExprKind::ListComp {
                element,
                target,
                iter,
                conditions,
            } => {
                let iterable = self.eval_expr(code, iter, frame)?;
                let items = iterable.iter_values().ok_or_else(|| not_iterable(&iterable, iter.range))?;
                let mut scope = frame.scope();
                let mut values = Vec::with_capacity(items.len());

                'items: for item in items {
                    self.assign(code, target, item, &mut scope)?;
                    for condition in conditions {
                        if !self.eval_expr(code, condition, &mut scope)?.is_truthy() {
                            continue 'items;
                        }
                    }
                    values.push(self.eval_expr(code, element, &mut scope)?);
                }
                Ok(RuntimeValue::list(values))
            }
            ExprKind::Attribute { value, attr } => {
                let value = self.eval_expr(code, value, frame)?;
                match &value {
                    RuntimeValue::Function(func) if attr == "__name__" => Ok(RuntimeValue::str(&func.name)),
                    _ if builtin::has_method(&value, attr) => Ok(RuntimeValue::BoundMethod(Rc::new(BoundMethod {
                        receiver: value,
                        name: attr.clone(),
                    }))),
                    _ => Err(RuntimeError::AttributeError(
                        range,
                        value.type_name().to_string(),
                        attr.to_string(),
                    )),
                }
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval_expr(code, value, frame)?;
                let index = self.eval_expr(code, index, frame)?;
                subscript(&value, &index, range)
            }
            ExprKind::Call { func, args } => {
                let callee = self.eval_expr(code, func, frame)?;
                let args = self.eval_args(code, args, frame, range)?;

                match &callee {
                    RuntimeValue::Builtin(name) if name == "locals" => {
                        if !args.is_empty() {
                            return Err(RuntimeError::TypeError(
                                range,
                                "locals() takes no arguments".to_string(),
                            ));
                        }
                        Ok(locals_dict(frame.env.borrow().locals()))
                    }
                    _ => self.call(&callee, args, range),
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(code, operand, frame)?;
                unary_op(*op, &operand, range)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(code, left, frame)?;
                let right = self.eval_expr(code, right, frame)?;
                binary_op(*op, &left, &right, range)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval_expr(code, left, frame)?;
                match (op, left.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval_expr(code, right, frame),
                }
            }
            ExprKind::Compare { left, comparisons } => {
                let mut left = self.eval_expr(code, left, frame)?;
                for (op, right) in comparisons {
                    let right = self.eval_expr(code, right, frame)?;
                    if !compare(*op, &left, &right, range)? {
                        return Ok(RuntimeValue::Bool(false));
                    }
                    left = right;
                }
                Ok(RuntimeValue::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval_expr(code, test, frame)?.is_truthy() {
                    self.eval_expr(code, body, frame)
                } else {
                    self.eval_expr(code, orelse, frame)
                }
            }
        }
    }

    fn eval_all(&mut self, code: Code, exprs: &[Expr], frame: &mut Frame) -> Result<Vec<RuntimeValue>, RuntimeError> {
        exprs.iter().map(|expr| self.eval_expr(code, expr, frame)).collect()
    }

    fn eval_args(&mut self, code: Code, args: &[Arg], frame: &mut Frame, range: Range) -> Result<Args, RuntimeError> {
        let mut result = Args::default();

        for arg in args {
            match arg {
                Arg::Positional(expr) => {
                    let value = self.eval_expr(code, expr, frame)?;
                    result.positional.push(value);
                }
                Arg::Star(expr) => {
                    let value = self.eval_expr(code, expr, frame)?;
                    let items = value.iter_values().ok_or_else(|| not_iterable(&value, expr.range))?;
                    result.positional.extend(items);
                }
                Arg::Keyword(name, expr) => {
                    let value = self.eval_expr(code, expr, frame)?;
                    push_keyword(&mut result, name.clone(), value, range)?;
                }
                Arg::DoubleStar(expr) => match self.eval_expr(code, expr, frame)? {
                    RuntimeValue::Dict(entries) => {
                        for (key, value) in entries.borrow().iter() {
                            let name = key.as_str().ok_or_else(|| {
                                RuntimeError::TypeError(expr.range, "keywords must be strings".to_string())
                            })?;
                            push_keyword(&mut result, SmolStr::new(name), value.clone(), range)?;
                        }
                    }
                    other => {
                        return Err(RuntimeError::TypeError(
                            expr.range,
                            format!("argument after ** must be a mapping, not {}", other.type_name()),
                        ));
                    }
                },
            }
        }

        Ok(result)
    }
}

fn push_keyword(args: &mut Args, name: SmolStr, value: RuntimeValue, range: Range) -> Result<(), RuntimeError> {
    if args.keyword(&name).is_some() {
        return Err(RuntimeError::TypeError(
            range,
            format!("keyword argument repeated: {}", name),
        ));
    }
    args.keywords.push((name, value));
    Ok(())
}

fn locals_dict(entries: Vec<(SmolStr, RuntimeValue)>) -> RuntimeValue {
    RuntimeValue::dict(
        entries
            .into_iter()
            .map(|(name, value)| (RuntimeValue::str(&name), value))
            .collect(),
    )
}

fn bind_params(func: &Function, args: Args, env: &Rc<RefCell<Env>>, range: Range) -> Result<(), RuntimeError> {
    let type_error = |message: String| RuntimeError::TypeError(range, format!("{}() {}", func.name, message));
    let positional_slots = func
        .params
        .iter()
        .enumerate()
        .take_while(|(_, param)| param.kind == ParamKind::Positional)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    let var_args = func.params.iter().position(|param| param.kind == ParamKind::VarArgs);
    let kw_args = func.params.iter().position(|param| param.kind == ParamKind::KwArgs);

    let mut values: Vec<Option<RuntimeValue>> = vec![None; func.params.len()];
    let mut extra_positional = Vec::new();
    let given = args.positional.len();

    for (i, value) in args.positional.into_iter().enumerate() {
        match positional_slots.get(i) {
            Some(slot) => values[*slot] = Some(value),
            None => extra_positional.push(value),
        }
    }

    match var_args {
        Some(slot) => values[slot] = Some(RuntimeValue::tuple(extra_positional)),
        None if !extra_positional.is_empty() => {
            return Err(type_error(format!(
                "takes {} positional arguments but {} were given",
                positional_slots.len(),
                given
            )));
        }
        None => {}
    }

    let mut extra_keywords = Vec::new();
    for (name, value) in args.keywords {
        let slot = func
            .params
            .iter()
            .position(|param| param.kind == ParamKind::Positional && param.name == name);
        match slot {
            Some(slot) if values[slot].is_some() => {
                return Err(type_error(format!("got multiple values for argument \"{}\"", name)));
            }
            Some(slot) => values[slot] = Some(value),
            None if kw_args.is_some() => extra_keywords.push((RuntimeValue::str(&name), value)),
            None => return Err(type_error(format!("got an unexpected keyword argument \"{}\"", name))),
        }
    }
    if let Some(slot) = kw_args {
        values[slot] = Some(RuntimeValue::dict(extra_keywords));
    }

    let mut env = env.borrow_mut();
    for (param, value) in func.params.iter().zip(values) {
        let value = match value.or_else(|| param.default.clone()) {
            Some(value) => value,
            None => return Err(type_error(format!("missing required argument \"{}\"", param.name))),
        };
        env.define(param.name.clone(), value);
    }

    Ok(())
}

fn not_iterable(value: &RuntimeValue, range: Range) -> RuntimeError {
    RuntimeError::TypeError(range, format!("\"{}\" object is not iterable", value.type_name()))
}

fn check_hashable(value: &RuntimeValue, range: Range) -> Result<(), RuntimeError> {
    if value.is_hashable() {
        Ok(())
    } else {
        Err(RuntimeError::TypeError(
            range,
            format!("unhashable type: \"{}\"", value.type_name()),
        ))
    }
}

fn subscript(value: &RuntimeValue, index: &RuntimeValue, range: Range) -> Result<RuntimeValue, RuntimeError> {
    let position = |len: usize| {
        let index = index.as_int().ok_or_else(|| {
            RuntimeError::TypeError(
                range,
                format!("{} indices must be integers, not {}", value.type_name(), index.type_name()),
            )
        })?;
        builtin::resolve_index(len, index).map_err(|e| e.to_runtime_error(range))
    };

    match value {
        RuntimeValue::List(items) => {
            let items = items.borrow();
            Ok(items[position(items.len())?].clone())
        }
        RuntimeValue::Tuple(items) => Ok(items[position(items.len())?].clone()),
        RuntimeValue::Str(s) => {
            let chars = s.chars().collect::<Vec<_>>();
            Ok(RuntimeValue::str(&chars[position(chars.len())?].to_string()))
        }
        RuntimeValue::Dict(_) => value
            .dict_get(index)
            .ok_or_else(|| RuntimeError::KeyError(range, index.repr())),
        other => Err(RuntimeError::TypeError(
            range,
            format!("\"{}\" object is not subscriptable", other.type_name()),
        )),
    }
}

fn unary_op(op: UnaryOp, operand: &RuntimeValue, range: Range) -> Result<RuntimeValue, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Not, _) => Ok(RuntimeValue::Bool(!operand.is_truthy())),
        (UnaryOp::Neg, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(-f)),
        (UnaryOp::Pos, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(*f)),
        (UnaryOp::Neg, _) if operand.as_int().is_some() => operand
            .as_int()
            .and_then(i64::checked_neg)
            .map(RuntimeValue::Int)
            .ok_or(RuntimeError::Overflow(range)),
        (UnaryOp::Pos, _) if operand.as_int().is_some() => Ok(RuntimeValue::Int(operand.as_int().unwrap_or_default())),
        _ => Err(RuntimeError::TypeError(
            range,
            format!(
                "bad operand type for unary {}: \"{}\"",
                if op == UnaryOp::Neg { "-" } else { "+" },
                operand.type_name()
            ),
        )),
    }
}

fn repeat(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

fn binary_op(op: BinaryOp, a: &RuntimeValue, b: &RuntimeValue, range: Range) -> Result<RuntimeValue, RuntimeError> {
    let unsupported = || {
        RuntimeError::TypeError(
            range,
            format!(
                "unsupported operand type(s) for {}: \"{}\" and \"{}\"",
                op,
                a.type_name(),
                b.type_name()
            ),
        )
    };
    let overflow = || RuntimeError::Overflow(range);

    if op == BinaryOp::Add {
        return builtin::add("+", a, b).map_err(|e| match e {
            builtin::Error::Overflow => overflow(),
            _ => unsupported(),
        });
    }

    if op == BinaryOp::Mul {
        match (a, b) {
            (RuntimeValue::Str(s), n) | (n, RuntimeValue::Str(s)) if n.as_int().is_some() => {
                return Ok(s.repeat(repeat(n.as_int().unwrap_or_default())).into());
            }
            (RuntimeValue::List(items), n) | (n, RuntimeValue::List(items)) if n.as_int().is_some() => {
                let items = items.borrow();
                let count = repeat(n.as_int().unwrap_or_default());
                return Ok(RuntimeValue::list(
                    std::iter::repeat_n(items.iter(), count).flatten().cloned().collect(),
                ));
            }
            (RuntimeValue::Tuple(items), n) | (n, RuntimeValue::Tuple(items)) if n.as_int().is_some() => {
                let count = repeat(n.as_int().unwrap_or_default());
                return Ok(RuntimeValue::tuple(
                    std::iter::repeat_n(items.iter(), count).flatten().cloned().collect(),
                ));
            }
            _ => {}
        }
    }

    match (op, Numbers::of(a, b).ok_or_else(unsupported)?) {
        (BinaryOp::Sub, Numbers::Int(a, b)) => a.checked_sub(b).map(RuntimeValue::Int).ok_or_else(overflow),
        (BinaryOp::Sub, Numbers::Float(a, b)) => Ok(RuntimeValue::Float(a - b)),
        (BinaryOp::Mul, Numbers::Int(a, b)) => a.checked_mul(b).map(RuntimeValue::Int).ok_or_else(overflow),
        (BinaryOp::Mul, Numbers::Float(a, b)) => Ok(RuntimeValue::Float(a * b)),
        (BinaryOp::Div, Numbers::Int(_, 0)) => Err(RuntimeError::ZeroDivision(range)),
        (BinaryOp::Div, Numbers::Int(a, b)) => Ok(RuntimeValue::Float(a as f64 / b as f64)),
        (BinaryOp::FloorDiv | BinaryOp::Mod, Numbers::Int(_, 0)) => Err(RuntimeError::ZeroDivision(range)),
        (BinaryOp::FloorDiv, Numbers::Int(a, b)) => {
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(RuntimeValue::Int(quotient - 1))
            } else {
                Ok(RuntimeValue::Int(quotient))
            }
        }
        (BinaryOp::Mod, Numbers::Int(a, b)) => {
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                Ok(RuntimeValue::Int(remainder + b))
            } else {
                Ok(RuntimeValue::Int(remainder))
            }
        }
        (BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod, Numbers::Float(_, b)) if b == 0.0 => {
            Err(RuntimeError::ZeroDivision(range))
        }
        (BinaryOp::Div, Numbers::Float(a, b)) => Ok(RuntimeValue::Float(a / b)),
        (BinaryOp::FloorDiv, Numbers::Float(a, b)) => Ok(RuntimeValue::Float((a / b).floor())),
        (BinaryOp::Mod, Numbers::Float(a, b)) => {
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                Ok(RuntimeValue::Float(remainder + b))
            } else {
                Ok(RuntimeValue::Float(remainder))
            }
        }
        (BinaryOp::Pow, Numbers::Int(0, b)) if b < 0 => Err(RuntimeError::ZeroDivision(range)),
        (BinaryOp::Pow, Numbers::Int(a, b)) if b < 0 => Ok(RuntimeValue::Float((a as f64).powf(b as f64))),
        (BinaryOp::Pow, Numbers::Int(a, b)) => u32::try_from(b)
            .ok()
            .and_then(|b| a.checked_pow(b))
            .map(RuntimeValue::Int)
            .ok_or_else(overflow),
        (BinaryOp::Pow, Numbers::Float(a, b)) if a == 0.0 && b < 0.0 => Err(RuntimeError::ZeroDivision(range)),
        (BinaryOp::Pow, Numbers::Float(a, b)) => Ok(RuntimeValue::Float(a.powf(b))),
        (BinaryOp::Add, _) => Err(unsupported()),
    }
}

fn compare(op: CmpOp, a: &RuntimeValue, b: &RuntimeValue, range: Range) -> Result<bool, RuntimeError> {
    let ordering = || {
        match a.partial_cmp(b) {
            Some(ordering) => Ok(Some(ordering)),
            // NaN compares false against everything.
            None if Numbers::of(a, b).is_some() => Ok(None),
            None => Err(RuntimeError::TypeError(
                range,
                format!(
                    "\"{}\" not supported between instances of \"{}\" and \"{}\"",
                    op,
                    a.type_name(),
                    b.type_name()
                ),
            )),
        }
    };

    match op {
        CmpOp::Eq => Ok(a == b),
        CmpOp::NotEq => Ok(a != b),
        CmpOp::Lt => Ok(ordering()?.is_some_and(|o| o.is_lt())),
        CmpOp::Lte => Ok(ordering()?.is_some_and(|o| o.is_le())),
        CmpOp::Gt => Ok(ordering()?.is_some_and(|o| o.is_gt())),
        CmpOp::Gte => Ok(ordering()?.is_some_and(|o| o.is_ge())),
        CmpOp::In => contains(b, a, range),
        CmpOp::NotIn => contains(b, a, range).map(|found| !found),
        CmpOp::Is => Ok(a.is_same(b)),
        CmpOp::IsNot => Ok(!a.is_same(b)),
    }
}

fn contains(container: &RuntimeValue, item: &RuntimeValue, range: Range) -> Result<bool, RuntimeError> {
    match (container, item) {
        (RuntimeValue::Str(haystack), RuntimeValue::Str(needle)) => Ok(haystack.contains(&**needle)),
        (RuntimeValue::Str(_), other) => Err(RuntimeError::TypeError(
            range,
            format!("\"in <string>\" requires string as left operand, not {}", other.type_name()),
        )),
        (RuntimeValue::List(items), _) => Ok(items.borrow().iter().any(|value| value == item)),
        (RuntimeValue::Tuple(items), _) => Ok(items.iter().any(|value| value == item)),
        (RuntimeValue::Dict(entries), _) => Ok(entries.borrow().iter().any(|(key, _)| key == item)),
        (other, _) => Err(RuntimeError::TypeError(
            range,
            format!("argument of type \"{}\" is not iterable", other.type_name()),
        )),
    }
}
