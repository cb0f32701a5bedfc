use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    path::{Path, PathBuf},
    rc::Rc,
};

use smol_str::SmolStr;

use crate::{
    Error, Options,
    ast::node::Tree,
    eval::{
        Evaluator,
        env::Env,
        error::RuntimeError,
        runtime_value::{Args, NativeFunction, RuntimeValue},
    },
    range::Range,
};

pub(crate) struct NamespaceInner {
    pub(crate) name: SmolStr,
    pub(crate) file: Option<PathBuf>,
    pub(crate) globals: Rc<RefCell<Env>>,
    pub(crate) output: RefCell<String>,
    pub(crate) options: Options,
}

thread_local! {
    static GLOBAL: Namespace = Namespace::new("__main__");
}

/// A module scope that code is executed in and installed into.
#[derive(Clone)]
pub struct Namespace {
    inner: Rc<NamespaceInner>,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self::with_options(name, None, Options::default())
    }

    pub fn with_file(name: &str, file: impl Into<PathBuf>) -> Self {
        Self::with_options(name, Some(file.into()), Options::default())
    }

    pub fn with_options(name: &str, file: Option<PathBuf>, options: Options) -> Self {
        Self {
            inner: Rc::new(NamespaceInner {
                name: SmolStr::new(name),
                file,
                globals: Env::default().shared(),
                output: RefCell::new(String::new()),
                options,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<NamespaceInner>) -> Self {
        Self { inner }
    }

    /// The per-thread namespace used for code that has no owning module.
    pub fn global() -> Namespace {
        GLOBAL.with(Namespace::clone)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn file(&self) -> Option<&Path> {
        self.inner.file.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Parses and runs `code` at the top level of this namespace.
    pub fn exec(&self, code: &str) -> Result<(), Box<Error>> {
        let tree = crate::parse(code)?;
        self.exec_tree(tree, code)
            .map_err(|err| Box::new(Error::from_error(code, err)))
    }

    /// Runs an already parsed tree. `source` is the text the tree was parsed from.
    pub fn exec_tree(&self, tree: Tree, source: &str) -> Result<(), RuntimeError> {
        tracing::trace!(namespace = %self.inner.name, statements = tree.body.len(), "exec");
        Evaluator::new(Rc::clone(&self.inner)).exec_module(Rc::new(tree), Rc::from(source))
    }

    pub fn get(&self, name: &str) -> Option<RuntimeValue> {
        self.inner.globals.borrow().get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.globals.borrow().contains(name)
    }

    pub fn define(&self, name: &str, value: RuntimeValue) {
        self.inner.globals.borrow_mut().define(SmolStr::new(name), value);
    }

    pub fn define_native(
        &self,
        name: &str,
        func: impl Fn(&Args) -> Result<RuntimeValue, RuntimeError> + 'static,
    ) {
        self.define(name, RuntimeValue::Native(NativeFunction::new(name, func)));
    }

    pub fn remove(&self, name: &str) -> Option<RuntimeValue> {
        self.inner.globals.borrow_mut().remove(name)
    }

    /// Global names, sorted.
    pub fn names(&self) -> Vec<SmolStr> {
        self.inner
            .globals
            .borrow()
            .locals()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Calls the value bound to `name`.
    pub fn call(&self, name: &str, args: Args) -> Result<RuntimeValue, RuntimeError> {
        let callee = self
            .get(name)
            .ok_or_else(|| RuntimeError::NameError(Range::default(), name.to_string()))?;
        self.call_value(&callee, args)
    }

    pub fn call_value(&self, callee: &RuntimeValue, args: Args) -> Result<RuntimeValue, RuntimeError> {
        Evaluator::new(Rc::clone(&self.inner)).call(callee, args, Range::default())
    }

    /// Everything printed so far.
    pub fn output(&self) -> String {
        self.inner.output.borrow().clone()
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.inner.output.borrow_mut())
    }
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.inner.name)
            .field("file", &self.inner.file)
            .finish()
    }
}
