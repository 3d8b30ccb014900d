//! `folium` command line entry point.

use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use folium::cli::{FoliumArgs, execute_command};

fn main() -> anyhow::Result<()> {
    let args = FoliumArgs::parse();

    let level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    Builder::new()
        .filter_level(level)
        .parse_env("FOLIUM_LOG")
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    execute_command(args)?;
    Ok(())
}
