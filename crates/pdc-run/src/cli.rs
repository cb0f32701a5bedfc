use std::io::Write;
use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use miette::miette;
use pdc::{Args, Conversion, DynamicCodeBuilder, Namespace, Options, RuntimeValue, Source, fresh_name};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pdc")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To show the sections of a routine:\n\
    pdc sections module.pd fast_path\n\n\
    ## To print its conversion program:\n\
    pdc convert module.pd fast_path\n\n\
    ## To generate exec code for slow arguments and run it:\n\
    pdc exec module.pd fast_path --template-handler handler --arg 3 --arg '[1, 2]'")]
#[command(
    about = "pdc turns annotated fast-path routines into specialized generated code.",
    long_about = None
)]
pub struct Cli {
    /// Increase logging verbosity (-v debug, -vv trace). RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load naming options from a TOML file
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the section tree of a routine
    Sections(RoutineArgs),
    /// Print the conversion program of a routine
    Convert(RoutineArgs),
    /// Generate exec code for the given arguments, print it and invoke it
    Exec {
        #[clap(flatten)]
        routine: RoutineArgs,

        /// Function in FILE that substitutes templates: (section, matched, locals) -> str
        #[arg(long, value_name = "NAME")]
        template_handler: String,

        /// Argument expression evaluated in the module; repeat for each argument
        #[arg(long = "arg", value_name = "EXPR")]
        args: Vec<String>,
    },
}

#[derive(Debug, clap::Args)]
struct RoutineArgs {
    /// Source file defining the routine
    file: PathBuf,
    /// Name of the annotated routine
    function: String,
}

impl RoutineArgs {
    /// Runs the module and looks up the routine.
    fn load(&self) -> miette::Result<(Namespace, RuntimeValue)> {
        if !self.file.exists() {
            return Err(miette!("File not found: {}", self.file.display()));
        }
        let content = fs::read_to_string(&self.file).into_diagnostic()?;
        let module = self
            .file
            .file_stem()
            .map_or_else(|| "main".to_string(), |stem| stem.to_string_lossy().into_owned());

        let namespace = Namespace::with_file(&module, self.file.clone());
        namespace.exec(&content).map_err(|err| miette::Report::new(*err))?;
        namespace.take_output();

        let routine = namespace
            .get(&self.function)
            .ok_or_else(|| miette!("Function not found: {}", self.function))?;
        Ok((namespace, routine))
    }
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();
        let options = self.options()?;
        let mut stdout = std::io::stdout().lock();

        match &self.commands {
            Commands::Sections(routine) => {
                let (namespace, routine) = routine.load()?;
                let conversion = convert(&namespace, &routine, &options)?;
                for section in &conversion.sections {
                    writeln!(stdout, "{section}").into_diagnostic()?;
                }
            }
            Commands::Convert(routine) => {
                let (namespace, routine) = routine.load()?;
                let conversion = convert(&namespace, &routine, &options)?;
                writeln!(stdout, "{}", conversion.code).into_diagnostic()?;
            }
            Commands::Exec {
                routine,
                template_handler,
                args,
            } => {
                let (namespace, routine) = routine.load()?;
                let handler = namespace
                    .get(template_handler)
                    .ok_or_else(|| miette!("Template handler not found: {}", template_handler))?;
                let args = Args::new(
                    args.iter()
                        .map(|expr| evaluate(&namespace, expr))
                        .collect::<miette::Result<Vec<_>>>()?,
                );

                let dynamic = DynamicCodeBuilder::builder()
                    .host_template_handler(handler)
                    .options(options)
                    .build()?;
                let mut runner = dynamic.load_routine(&routine)?;
                runner.refresh(args.clone())?;
                namespace.take_output();

                let result = runner.call(args)?;
                writeln!(stdout, "{}", runner.exec_code().unwrap_or_default()).into_diagnostic()?;
                write!(stdout, "{}", namespace.take_output()).into_diagnostic()?;
                writeln!(stdout, "{}", result.repr()).into_diagnostic()?;
            }
        }

        stdout.flush().into_diagnostic()
    }

    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
            .with_writer(std::io::stderr)
            .try_init();
    }

    fn options(&self) -> miette::Result<Options> {
        match &self.config {
            Some(path) => {
                let content = fs::read_to_string(path).into_diagnostic()?;
                toml::from_str(&content).into_diagnostic()
            }
            None => Ok(Options::default()),
        }
    }
}

/// Builds the conversion program without installing anything.
fn convert(namespace: &Namespace, routine: &RuntimeValue, options: &Options) -> miette::Result<Conversion> {
    let acquired = Source::Routine(routine.clone()).acquire()?;
    let name = fresh_name(namespace, &options.conversion_name);
    let template = fresh_name(namespace, &options.template_name_prefix);
    tracing::debug!(name, template, "converting");

    Ok(pdc::convert(&acquired.text, &name, &template)?)
}

/// Evaluates `expr` at the top level of `namespace`.
fn evaluate(namespace: &Namespace, expr: &str) -> miette::Result<RuntimeValue> {
    pdc_lang::parse_expr(expr).map_err(|err| miette::Report::new(*err))?;

    let name = fresh_name(namespace, "__pdc_arg_");
    namespace
        .exec(&format!("{name} = {expr}"))
        .map_err(|err| miette::Report::new(*err))?;
    namespace
        .remove(&name)
        .ok_or_else(|| miette!("Argument did not evaluate: {}", expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::int("21", RuntimeValue::Int(21))]
    #[case::string("'a' + 'b'", RuntimeValue::str("ab"))]
    #[case::module_name("base * 2", RuntimeValue::Int(20))]
    fn test_evaluate(#[case] expr: &str, #[case] expected: RuntimeValue) {
        let namespace = Namespace::new("cli");
        namespace.exec("base = 10").unwrap();

        assert_eq!(evaluate(&namespace, expr).unwrap(), expected);
        assert!(!namespace.contains("__pdc_arg_0"));
    }

    #[test]
    fn test_parse_exec_command() {
        let cli = Cli::try_parse_from([
            "pdc",
            "-vv",
            "exec",
            "m.pd",
            "f",
            "--template-handler",
            "h",
            "--arg",
            "1",
            "--arg",
            "[2]",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.commands {
            Commands::Exec {
                routine,
                template_handler,
                args,
            } => {
                assert_eq!(routine.function, "f");
                assert_eq!(template_handler, "h");
                assert_eq!(args, vec!["1", "[2]"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
