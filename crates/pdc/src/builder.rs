use std::rc::Rc;

use pdc_lang::{Args, Namespace, RuntimeValue, TemplateError};

use crate::{
    Error,
    error::ConfigError,
    host::CodeHost,
    options::Options,
    policy::Recalculation,
    runner::Runner,
    source::Source,
    template::{Locals, TemplateHandler},
};

/// Collects the configuration of a [`DynamicCode`].
///
/// ```rust
/// use pdc::{DynamicCodeBuilder, simple_hash};
///
/// let dynamic = DynamicCodeBuilder::builder()
///     .template_handler(|_, matched, _| Ok(matched.to_lowercase()))
///     .hash(simple_hash)
///     .build()
///     .unwrap();
/// # let _ = dynamic;
/// ```
#[derive(Default)]
pub struct DynamicCodeBuilder {
    template_handler: Option<TemplateHandler>,
    hash: Option<Rc<crate::policy::HashFn>>,
    compare: Option<Rc<crate::policy::CompareFn>>,
    options: Options,
}

impl DynamicCodeBuilder {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn template_handler(
        mut self,
        handler: impl Fn(&str, &str, &Locals) -> Result<String, TemplateError> + 'static,
    ) -> Self {
        self.template_handler = Some(TemplateHandler::native(handler));
        self
    }

    /// Uses a host-language callable `(section, matched, locals) -> str` as the template handler.
    pub fn host_template_handler(mut self, handler: RuntimeValue) -> Self {
        self.template_handler = Some(TemplateHandler::Host(handler));
        self
    }

    pub fn hash(mut self, func: impl Fn(&Args) -> u64 + 'static) -> Self {
        self.hash = Some(Rc::new(func));
        self
    }

    /// `func(previous, current)` returns `true` when the exec code must be regenerated.
    pub fn compare(mut self, func: impl Fn(&Args, &Args) -> bool + 'static) -> Self {
        self.compare = Some(Rc::new(func));
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<DynamicCode, ConfigError> {
        let recalculation = match (self.hash, self.compare) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingRecalculation),
            (Some(hash), None) => Recalculation::Hash(hash),
            (None, Some(compare)) => Recalculation::Compare(compare),
            (None, None) => Recalculation::Manual,
        };
        let template_handler = self.template_handler.ok_or(ConfigError::MissingTemplateHandler)?;

        Ok(DynamicCode {
            template_handler,
            recalculation,
            options: self.options,
        })
    }
}

/// A validated configuration. Each loaded routine gets its own [`Runner`].
#[derive(Debug, Clone)]
pub struct DynamicCode {
    pub(crate) template_handler: TemplateHandler,
    pub(crate) recalculation: Recalculation,
    pub(crate) options: Options,
}

impl DynamicCode {
    /// Compiles `source` into `host`.
    pub fn load<H: CodeHost>(&self, source: impl Into<Source>, host: H) -> Result<Runner<H>, Error> {
        let acquired = source.into().acquire()?;
        Runner::new(self, acquired, host)
    }

    /// Compiles a live routine into the namespace it was defined in, or the
    /// global namespace if it has none.
    pub fn load_routine(&self, routine: &RuntimeValue) -> Result<Runner<Namespace>, Error> {
        let acquired = Source::Routine(routine.clone()).acquire()?;
        let host = acquired.namespace.clone().unwrap_or_else(Namespace::global);
        Runner::new(self, acquired, host)
    }

    pub fn recalculation(&self) -> &Recalculation {
        &self.recalculation
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{simple_compare, simple_hash};

    fn handler(_: &str, matched: &str, _: &Locals) -> Result<String, TemplateError> {
        Ok(matched.to_string())
    }

    #[test]
    fn test_conflicting_recalculation() {
        let result = DynamicCodeBuilder::builder()
            .template_handler(handler)
            .hash(simple_hash)
            .compare(simple_compare)
            .build();

        assert!(matches!(result, Err(ConfigError::ConflictingRecalculation)));
    }

    #[test]
    fn test_missing_template_handler() {
        assert!(matches!(
            DynamicCodeBuilder::builder().build(),
            Err(ConfigError::MissingTemplateHandler)
        ));
    }

    #[test]
    fn test_recalculation_modes() {
        let manual = DynamicCodeBuilder::builder().template_handler(handler).build().unwrap();
        let hash = DynamicCodeBuilder::builder()
            .template_handler(handler)
            .hash(simple_hash)
            .build()
            .unwrap();

        assert!(matches!(manual.recalculation(), Recalculation::Manual));
        assert!(matches!(hash.recalculation(), Recalculation::Hash(_)));
    }
}
