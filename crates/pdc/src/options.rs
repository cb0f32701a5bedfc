use serde::Deserialize;

/// Naming of the code a runner installs.
///
/// Each prefix is followed by the first number that is free in the target
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Options {
    /// Prefix of exec routines.
    pub name_prefix: String,
    /// Prefix of template handlers.
    pub template_name_prefix: String,
    /// Prefix of conversion functions.
    pub conversion_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name_prefix: "__pdc_dynamic_func_".to_string(),
            template_name_prefix: "__pdc_template_".to_string(),
            conversion_name: "__pdc_conversion_".to_string(),
        }
    }
}
