use std::process::ExitCode;

fn main() -> ExitCode {
    flux_syntax::cli::run()
}
