//! Command implementations for the Folium CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::document::Document;
use crate::error::{FoliumError, Result};
use crate::index::{IndexHandle, QueryParser};
use crate::model::BagOfCharsModel;
use crate::storage::{FileStorage, Storage, StorageConfig};

/// Execute a CLI command.
pub fn execute_command(args: FoliumArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index_documents(index_args, &args),
        Command::Search(search_args) => search_collection(search_args, &args),
        Command::Validate(validate_args) => validate_collection(validate_args, &args),
        Command::Truncate(truncate_args) => truncate_collection(truncate_args, &args),
        Command::Rename(rename_args) => rename_collection(rename_args, &args),
    }
}

/// Open the collection named by `args` in its directory.
fn open_collection(args: &CollectionArgs) -> Result<IndexHandle> {
    let config = args.index_config()?;
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::new(&args.directory, StorageConfig::default())?);
    IndexHandle::open(
        storage,
        &args.collection,
        config,
        Arc::new(BagOfCharsModel::new()),
    )
}

/// Store and index a JSON Lines file, committing every `batch_size` documents.
fn index_documents(args: &IndexArgs, cli_args: &FoliumArgs) -> Result<()> {
    if args.batch_size == 0 {
        return Err(FoliumError::invalid_argument("batch size must be positive"));
    }
    let handle = open_collection(&args.collection)?;
    let start_time = Instant::now();

    let reader = BufReader::new(File::open(&args.document_file)?);
    let mut session = handle.write_session()?;
    let mut batch = Vec::with_capacity(args.batch_size);
    let mut result = IndexingResult {
        collection: handle.collection().to_string(),
        documents_indexed: 0,
        lines_skipped: 0,
        commits: 0,
        pages_written: 0,
        postings_appends: 0,
        duration_ms: 0,
        docs_per_second: 0.0,
    };

    let mut lines = reader.lines().enumerate().peekable();
    while let Some((line_num, line)) = lines.next() {
        let line = line?;
        if !line.trim().is_empty() {
            match Document::from_json(&line) {
                Ok(document) => batch.push(document),
                Err(e) => {
                    warn!("skipping line {}: {e}", line_num + 1);
                    result.lines_skipped += 1;
                }
            }
        }

        if batch.len() == args.batch_size || (lines.peek().is_none() && !batch.is_empty()) {
            session.put_documents(&batch)?;
            let stats = session.commit()?;
            result.documents_indexed += batch.len();
            result.commits += 1;
            result.pages_written += stats.pages;
            result.postings_appends += stats.postings_appends;
            batch.clear();
            info!("indexed {} documents", result.documents_indexed);
        }
    }

    let duration = start_time.elapsed();
    result.duration_ms = duration.as_millis() as u64;
    result.docs_per_second = if duration.as_secs_f64() > 0.0 {
        result.documents_indexed as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    output_result("Documents indexed", &result, cli_args)
}

/// Run a query string against a collection.
fn search_collection(args: &SearchArgs, cli_args: &FoliumArgs) -> Result<()> {
    let handle = open_collection(&args.collection)?;
    let parser = match &args.field {
        Some(field) => QueryParser::with_default_field(field.clone()),
        None => QueryParser::new(),
    };
    let query = parser.parse(&args.query)?;

    let start_time = Instant::now();
    let results = handle.search_session()?.search(&query, args.skip, args.take)?;

    output_result(
        "Search completed",
        &SearchOutput {
            query: query.to_string(),
            total_hits: results.total,
            skip: args.skip,
            take: args.take,
            hits: results.hits,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn validate_collection(args: &ValidateArgs, cli_args: &FoliumArgs) -> Result<()> {
    let handle = open_collection(&args.collection)?;
    let start_time = Instant::now();
    let report = handle.validator().validate()?;

    output_result(
        "Collection is consistent",
        &ValidationResult {
            collection: handle.collection().to_string(),
            documents: report.documents,
            vectors: report.vectors,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

fn truncate_collection(args: &TruncateArgs, cli_args: &FoliumArgs) -> Result<()> {
    let handle = open_collection(&args.collection)?;
    let files_deleted = handle.truncate()?;

    output_result(
        "Collection truncated",
        &TruncateResult {
            collection: handle.collection().to_string(),
            files_deleted,
        },
        cli_args,
    )
}

fn rename_collection(args: &RenameArgs, cli_args: &FoliumArgs) -> Result<()> {
    let handle = open_collection(&args.collection)?;
    let from = handle.collection().to_string();
    let renamed = handle.rename(&args.new_name)?;

    output_result(
        "Collection renamed",
        &RenameResult {
            from,
            to: renamed.collection().to_string(),
        },
        cli_args,
    )
}
