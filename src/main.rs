use clap::Parser;
use trendlevels::cli::{run, Cli};
use trendlevels::logging::init_logging;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    run(cli)
}
