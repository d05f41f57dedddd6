use env_logger::{Builder, Target};
use log::LevelFilter;

use emsurvey::cli;

fn main() {
    let args = <cli::Args as clap::Parser>::parse();

    let level = match args.quiet() {
        true => LevelFilter::Warn,
        false => LevelFilter::Info,
    };
    // RUST_LOG takes precedence over the default level
    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .target(Target::Stderr)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    std::process::exit(cli::main(args));
}
