use std::rc::Rc;

use itertools::Itertools;
use pdc_lang::{Args, AstParam, Namespace, Range, RuntimeError, RuntimeValue};

use crate::{
    Error,
    builder::DynamicCode,
    convert::{self, exec_text, parse_generated},
    host::{CodeHost, fresh_name},
    policy::{CompareFn, HashFn, Recalculation},
    section::Section,
    source::Acquired,
};

enum Cache {
    Manual,
    Hash { func: Rc<HashFn>, last: Option<u64> },
    Compare { func: Rc<CompareFn>, snapshot: Option<Args> },
}

impl From<&Recalculation> for Cache {
    fn from(recalculation: &Recalculation) -> Self {
        match recalculation {
            Recalculation::Manual => Cache::Manual,
            Recalculation::Hash(func) => Cache::Hash {
                func: Rc::clone(func),
                last: None,
            },
            Recalculation::Compare(func) => Cache::Compare {
                func: Rc::clone(func),
                snapshot: None,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct ExecRoutine {
    name: String,
    code: String,
}

/// A staged routine installed in a code host.
///
/// Calls go to generated exec code, which is regenerated from the conversion
/// function according to the configured [`Recalculation`]. Everything the
/// runner installs is removed again when it is dropped.
pub struct Runner<H: CodeHost = Namespace> {
    host: H,
    config: DynamicCode,
    bound: Args,
    params: Vec<AstParam>,
    sections: Vec<Section>,
    template_name: String,
    conversion_name: Option<String>,
    conversion_code: String,
    cache: Cache,
    exec: Option<ExecRoutine>,
    refresh_count: usize,
}

impl<H: CodeHost> Runner<H> {
    pub(crate) fn new(config: &DynamicCode, acquired: Acquired, host: H) -> Result<Self, Error> {
        let template_name = fresh_name(&host, &config.options.template_name_prefix);
        config.template_handler.install(&host, &template_name);

        // From here on, dropping the runner cleans up after a failure.
        let mut runner = Runner {
            host,
            config: config.clone(),
            bound: acquired.bound,
            params: Vec::new(),
            sections: Vec::new(),
            template_name,
            conversion_name: None,
            conversion_code: String::new(),
            cache: Cache::from(&config.recalculation),
            exec: None,
            refresh_count: 0,
        };
        runner.compile(&acquired.text)?;
        Ok(runner)
    }

    fn compile(&mut self, text: &str) -> Result<(), Error> {
        let name = fresh_name(&self.host, &self.config.options.conversion_name);
        let conversion = convert::convert(text, &name, &self.template_name)?;
        let tree = parse_generated(&conversion.code)?;

        self.host.install(&name, tree, &conversion.code)?;
        self.conversion_name = Some(name);
        self.conversion_code = conversion.code;
        self.params = conversion.params;
        self.sections = conversion.sections;
        Ok(())
    }

    /// Invokes the exec routine, regenerating it first if the policy says so.
    pub fn call(&mut self, args: Args) -> Result<RuntimeValue, Error> {
        let args = args.prepend(&self.bound);

        let fingerprint = match &self.cache {
            Cache::Hash { func, .. } => Some(func(&args)),
            _ => None,
        };
        let stale = match &self.cache {
            Cache::Manual => false,
            Cache::Hash { last, .. } => *last != fingerprint,
            Cache::Compare { func, snapshot } => snapshot.as_ref().is_none_or(|previous| func(previous, &args)),
        };
        tracing::trace!(
            stale,
            installed = self.exec.is_some(),
            fingerprint,
            "cache decision"
        );

        if stale || self.exec.is_none() {
            self.regenerate(&args)?;
            match &mut self.cache {
                Cache::Manual => {}
                Cache::Hash { last, .. } => *last = fingerprint,
                Cache::Compare { snapshot, .. } => *snapshot = Some(args.clone()),
            }
        }

        let name = self.exec.as_ref().map(|exec| exec.name.clone()).unwrap_or_default();
        Ok(self.host.invoke(&name, args)?)
    }

    /// Regenerates the exec code from `args` right away.
    pub fn refresh(&mut self, args: Args) -> Result<(), Error> {
        let args = args.prepend(&self.bound);
        self.regenerate(&args)
    }

    /// Evicts the exec code. The next call regenerates it.
    pub fn reset(&mut self) {
        self.evict_exec();
    }

    fn evict_exec(&mut self) {
        if let Some(exec) = self.exec.take() {
            self.host.evict(&exec.name);
        }
    }

    fn regenerate(&mut self, args: &Args) -> Result<(), Error> {
        self.evict_exec();

        let conversion_name = self.conversion_name.clone().unwrap_or_default();
        let output = self.host.invoke(&conversion_name, args.clone())?;
        let body = exec_body(output)?;

        let name = fresh_name(&self.host, &self.config.options.name_prefix);
        let code = exec_text(&name, &self.params, &body);
        let tree = parse_generated(&code)?;
        self.host.install(&name, tree, &code)?;

        self.refresh_count += 1;
        tracing::info!(name, refresh_count = self.refresh_count, "regenerated exec code");
        self.exec = Some(ExecRoutine { name, code });
        Ok(())
    }

    pub fn conversion_code(&self) -> &str {
        &self.conversion_code
    }

    pub fn conversion_function_name(&self) -> Option<&str> {
        self.conversion_name.as_deref()
    }

    /// The full text of the current exec routine.
    pub fn exec_code(&self) -> Option<&str> {
        self.exec.as_ref().map(|exec| exec.code.as_str())
    }

    pub fn exec_function_name(&self) -> Option<&str> {
        self.exec.as_ref().map(|exec| exec.name.as_str())
    }

    pub fn template_function_name(&self) -> &str {
        &self.template_name
    }

    /// How many times exec code has been generated.
    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: CodeHost> Drop for Runner<H> {
    fn drop(&mut self) {
        self.evict_exec();
        if let Some(name) = self.conversion_name.take() {
            self.host.evict(&name);
        }
        self.host.evict(&self.template_name);
    }
}

/// Joins the fragments yielded by a conversion function.
fn exec_body(output: RuntimeValue) -> Result<String, Error> {
    let fragments = match output {
        RuntimeValue::None => return Ok(String::new()),
        output => output.iter_values().ok_or_else(|| {
            RuntimeError::TypeError(
                Range::default(),
                format!("conversion produced a {} instead of text", output.type_name()),
            )
        })?,
    };

    Ok(fragments
        .iter()
        .map(|fragment| match fragment {
            RuntimeValue::Str(text) => Ok(text.to_string()),
            other => Err(RuntimeError::TypeError(
                Range::default(),
                format!("conversion yielded a {} instead of text", other.type_name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::none(RuntimeValue::None, "")]
    #[case::fragments(RuntimeValue::list(vec!["a = 1".into(), "b = a".into()]), "a = 1\nb = a")]
    fn test_exec_body(#[case] output: RuntimeValue, #[case] expected: &str) {
        assert_eq!(exec_body(output).unwrap(), expected);
    }

    #[test]
    fn test_exec_body_rejects_non_text() {
        assert!(matches!(
            exec_body(RuntimeValue::list(vec![RuntimeValue::Int(1)])),
            Err(Error::Runtime(RuntimeError::TypeError(_, _)))
        ));
    }
}
