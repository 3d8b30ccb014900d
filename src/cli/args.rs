//! Command line argument parsing for the Folium CLI using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexConfig;
use crate::vector::ElementWidth;

/// Folium - document search over paged vector trees
#[derive(Parser, Debug, Clone)]
#[command(name = "folium")]
#[command(about = "Document search over paged, disk-resident vector trees")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct FoliumArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl FoliumArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store and index documents from a JSON Lines file
    Index(IndexArgs),

    /// Search a collection
    Search(SearchArgs),

    /// Check that every stored document resolves back to itself
    Validate(ValidateArgs),

    /// Delete every file of a collection
    Truncate(TruncateArgs),

    /// Rename a collection
    Rename(RenameArgs),
}

/// Location and settings of a collection, shared by every command.
#[derive(Args, Debug, Clone)]
pub struct CollectionArgs {
    /// Directory holding the collection files
    #[arg(short, long, env = "FOLIUM_DIRECTORY", default_value = ".")]
    pub directory: PathBuf,

    /// Collection name
    #[arg(short, long)]
    pub collection: String,

    /// Collection configuration file (JSON)
    #[arg(long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Page size of the document key pages, in bytes
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Width of stored vector values
    #[arg(long, value_enum)]
    pub element_width: Option<ElementWidth>,
}

impl CollectionArgs {
    /// Configuration file, if any, with flags applied on top.
    pub fn index_config(&self) -> Result<IndexConfig> {
        let mut config = match &self.config {
            Some(path) => IndexConfig::from_json(&std::fs::read_to_string(path)?)?,
            None => IndexConfig::default(),
        };
        if let Some(page_size) = self.page_size {
            config.document_page_size = page_size;
        }
        if let Some(width) = self.element_width {
            config.element_width = width;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for indexing documents
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub collection: CollectionArgs,

    /// Document file path (JSON Lines, one object per line)
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Documents per commit. Each commit appends at least one full document
    /// key page, so very small batches grow the key streams quickly
    #[arg(short, long, default_value = "1000")]
    pub batch_size: usize,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub collection: CollectionArgs,

    /// Query string, e.g. `title:apple +color:red -color:green`
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Field for clauses without `field:`
    #[arg(long)]
    pub field: Option<String>,

    /// Number of results to skip
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Number of results to return
    #[arg(long, default_value = "10")]
    pub take: usize,
}

/// Arguments for validation
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub collection: CollectionArgs,
}

/// Arguments for truncation
#[derive(Parser, Debug, Clone)]
pub struct TruncateArgs {
    #[command(flatten)]
    pub collection: CollectionArgs,
}

/// Arguments for renaming
#[derive(Parser, Debug, Clone)]
pub struct RenameArgs {
    #[command(flatten)]
    pub collection: CollectionArgs,

    /// New collection name
    #[arg(value_name = "NEW_NAME")]
    pub new_name: String,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_command() {
        let args = FoliumArgs::try_parse_from([
            "folium",
            "search",
            "--directory",
            "/data",
            "--collection",
            "books",
            "title:apple",
            "--skip",
            "10",
            "--take",
            "5",
        ])
        .unwrap();

        if let Command::Search(search_args) = args.command {
            assert_eq!(search_args.collection.directory, PathBuf::from("/data"));
            assert_eq!(search_args.collection.collection, "books");
            assert_eq!(search_args.query, "title:apple");
            assert_eq!(search_args.skip, 10);
            assert_eq!(search_args.take, 5);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_index_command_config() {
        let args = FoliumArgs::try_parse_from([
            "folium",
            "index",
            "-c",
            "books",
            "docs.jsonl",
            "--page-size",
            "512",
            "--element-width",
            "f64",
        ])
        .unwrap();

        if let Command::Index(index_args) = args.command {
            assert_eq!(index_args.document_file, PathBuf::from("docs.jsonl"));
            assert_eq!(index_args.batch_size, 1000);
            let config = index_args.collection.index_config().unwrap();
            assert_eq!(config.document_page_size, 512);
            assert_eq!(config.element_width, ElementWidth::F64);
        } else {
            panic!("Expected Index command");
        }
    }

    #[test]
    fn test_invalid_page_size_is_rejected() {
        let args = FoliumArgs::try_parse_from([
            "folium", "validate", "-c", "books", "--page-size", "100",
        ])
        .unwrap();
        if let Command::Validate(validate_args) = args.command {
            assert!(validate_args.collection.index_config().is_err());
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let args = FoliumArgs::try_parse_from(["folium", "truncate", "-c", "x"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = FoliumArgs::try_parse_from(["folium", "-vvv", "truncate", "-c", "x"]).unwrap();
        assert_eq!(args.verbosity(), 3);

        let args =
            FoliumArgs::try_parse_from(["folium", "-q", "-v", "truncate", "-c", "x"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args = FoliumArgs::try_parse_from([
            "folium", "rename", "-c", "old", "new", "--format", "json",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}
