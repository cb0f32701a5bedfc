//! `pdc` stages annotated fast-path routines into specialized code.
//!
//! A routine marks its regions with `# PDC-` directive comments. From the
//! annotated source, `pdc` derives a conversion program which, run with the
//! slowly changing arguments, yields the text of a specialized exec routine.
//! A [`Runner`] installs that text into a [`CodeHost`] and regenerates it
//! when the configured [`Recalculation`] policy says the inputs changed.
//!
//! ## Examples
//!
//! ```rust
//! use pdc::{Args, DynamicCodeBuilder, Namespace, RuntimeValue};
//!
//! let dynamic = DynamicCodeBuilder::builder()
//!     .template_handler(|_, matched, _| Ok(matched.to_string()))
//!     .build()
//!     .unwrap();
//!
//! let source = "def greet(name):\n    # PDC-Function\n    # PDC-VerbatimLine\n    print('hello ' + name)";
//! let mut runner = dynamic.load(source, Namespace::new("demo")).unwrap();
//! runner.call(Args::new(vec![RuntimeValue::str("ada")])).unwrap();
//!
//! assert_eq!(
//!     runner.exec_code(),
//!     Some("def __pdc_dynamic_func_0(name):\n    print('hello ' + name)")
//! );
//! ```
//!
//! ## Directives
//!
//! | Directive | Effect |
//! |---|---|
//! | `# PDC-Function` | Starts the routine body; everything before it is dropped. |
//! | `# PDC-Start <name>` / `# PDC-End <name>` | Delimits a named section. |
//! | `# PDC-Verbatim` | Emits every statement of the section as written. |
//! | `# PDC-TemplateCode` | Like `Verbatim`, with `Replace` patterns substituted. |
//! | `# PDC-Replace <pattern>` | A substring the template handler replaces. |
//! | `# PDC-Kill` | Drops the section from the exec code. |
//! | `# PDC-KillIf <condition>` | Drops the section when the condition holds at conversion time. |
//! | `# PDC-VerbatimLine` | Emits the next statement as written. |
//! | `# PDC-KillLine` | Drops the next statement from the exec code. |
pub mod annotate;
pub mod builder;
pub mod convert;
pub mod directive;
pub mod error;
pub mod host;
pub mod options;
pub mod policy;
pub mod rule;
pub mod runner;
pub mod section;
pub mod source;
pub mod template;
pub mod writer;

pub use annotate::{AnnotatedTree, annotate};
pub use builder::{DynamicCode, DynamicCodeBuilder};
pub use convert::{Conversion, convert};
pub use directive::{Directive, DirectiveKind, PREFIX, find_directives};
pub use error::{ConfigError, DirectiveError, Error, StructureError};
pub use host::{CodeHost, fresh_name};
pub use options::Options;
pub use pdc_lang::{Args, Namespace, RuntimeValue, TemplateError};
pub use policy::{Recalculation, simple_compare, simple_hash};
pub use rule::Rule;
pub use runner::Runner;
pub use section::Section;
pub use source::Source;
pub use template::{Locals, TemplateHandler};
pub use writer::ConversionWriter;
