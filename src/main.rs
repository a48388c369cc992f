use clap::Parser;
use cliploop::cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    cliploop::logging::init(cli.verbose);

    let result = cliploop::app::run(cli);
    if let Err(err) = &result {
        eprintln!("error: {err:#}");
    }
    ExitCode::from(cliploop::app::exit_code(&result))
}
