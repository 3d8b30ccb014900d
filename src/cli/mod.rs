//! The `folium` command line: argument parsing, command execution and
//! result rendering.

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Command, FoliumArgs, OutputFormat};
pub use commands::execute_command;
