use clap::Parser;

fn main() -> miette::Result<()> {
    pdc_run::Cli::parse().run()
}
