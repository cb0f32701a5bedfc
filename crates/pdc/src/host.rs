use pdc_lang::{Args, Namespace, RuntimeError, RuntimeValue, Tree};

use crate::Error;

/// A place generated code is installed into and called from.
///
/// The runner only touches names it created itself.
pub trait CodeHost {
    fn is_defined(&self, name: &str) -> bool;

    /// Executes `tree`, parsed from `source`, which is expected to define `name`.
    fn install(&self, name: &str, tree: Tree, source: &str) -> Result<(), Error>;

    fn define(&self, name: &str, value: RuntimeValue);

    /// Removes `name`, returning whether it was defined.
    fn evict(&self, name: &str) -> bool;

    fn invoke(&self, name: &str, args: Args) -> Result<RuntimeValue, RuntimeError>;
}

impl CodeHost for Namespace {
    fn is_defined(&self, name: &str) -> bool {
        self.contains(name)
    }

    fn install(&self, name: &str, tree: Tree, source: &str) -> Result<(), Error> {
        self.exec_tree(tree, source)?;
        if !self.contains(name) {
            return Err(Error::Source(format!("installed code does not define {name}")));
        }
        tracing::debug!(namespace = self.name(), name, "installed");
        Ok(())
    }

    fn define(&self, name: &str, value: RuntimeValue) {
        Namespace::define(self, name, value);
        tracing::debug!(namespace = self.name(), name, "defined");
    }

    fn evict(&self, name: &str) -> bool {
        let evicted = self.remove(name).is_some();
        if evicted {
            tracing::debug!(namespace = self.name(), name, "evicted");
        }
        evicted
    }

    fn invoke(&self, name: &str, args: Args) -> Result<RuntimeValue, RuntimeError> {
        self.call(name, args)
    }
}

/// The first name in `prefix0`, `prefix1`, ... that `host` does not define.
pub fn fresh_name<H: CodeHost + ?Sized>(host: &H, prefix: &str) -> String {
    let mut n = 0usize;
    loop {
        let name = format!("{prefix}{n}");
        if !host.is_defined(&name) {
            return name;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_name_skips_taken_names() {
        let namespace = Namespace::new("host");
        namespace.define("gen_0", RuntimeValue::None);
        namespace.define("gen_1", RuntimeValue::None);

        assert_eq!(fresh_name(&namespace, "gen_"), "gen_2");
        namespace.remove("gen_0");
        assert_eq!(fresh_name(&namespace, "gen_"), "gen_0");
    }

    #[test]
    fn test_install_and_evict() {
        let namespace = Namespace::new("host");
        let code = "def g(x):\n    return x + 1";
        let tree = pdc_lang::parse(code).unwrap();

        namespace.install("g", tree, code).unwrap();
        assert_eq!(
            namespace.invoke("g", Args::new(vec![RuntimeValue::Int(1)])),
            Ok(RuntimeValue::Int(2))
        );
        assert!(CodeHost::evict(&namespace, "g"));
        assert!(!CodeHost::evict(&namespace, "g"));
        assert!(!namespace.is_defined("g"));
    }

    #[test]
    fn test_install_requires_name() {
        let namespace = Namespace::new("host");
        let tree = pdc_lang::parse("x = 1").unwrap();

        assert!(namespace.install("g", tree, "x = 1").is_err());
    }
}
