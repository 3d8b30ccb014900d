//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::args::{FoliumArgs, OutputFormat};
use crate::error::Result;
use crate::index::SearchHit;

/// Result of the `index` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexingResult {
    pub collection: String,
    pub documents_indexed: usize,
    pub lines_skipped: usize,
    pub commits: usize,
    pub pages_written: usize,
    pub postings_appends: usize,
    pub duration_ms: u64,
    pub docs_per_second: f64,
}

/// Result of the `search` command.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub query: String,
    pub total_hits: usize,
    pub skip: usize,
    pub take: usize,
    pub hits: Vec<SearchHit>,
    pub duration_ms: u64,
}

/// Result of the `validate` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub collection: String,
    pub documents: usize,
    pub vectors: usize,
    pub duration_ms: u64,
}

/// Result of the `truncate` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct TruncateResult {
    pub collection: String,
    pub files_deleted: usize,
}

/// Result of the `rename` command.
#[derive(Debug, Serialize, Deserialize)]
pub struct RenameResult {
    pub from: String,
    pub to: String,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &FoliumArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &FoliumArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if value.get("hits").is_some_and(Value::is_array) {
        output_search_results_human(&value);
    } else {
        output_generic_human(&value);
    }
    Ok(())
}

/// Output search results in human format.
fn output_search_results_human(value: &Value) {
    let hits = value
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let skip = value.get("skip").and_then(Value::as_u64).unwrap_or(0);

    println!("Search Results:");
    println!("═══════════════");
    for (i, hit) in hits.iter().enumerate() {
        println!();
        println!(
            "Result {} (doc {}, score {:.3})",
            skip + i as u64 + 1,
            hit.get("doc_id").and_then(Value::as_u64).unwrap_or(0),
            hit.get("score").and_then(Value::as_f64).unwrap_or(0.0)
        );
        println!("─────────────");
        match hit.get("document").and_then(Value::as_object) {
            Some(fields) => {
                for (name, field) in fields {
                    println!("{name}: {}", format_value(field));
                }
            }
            None => println!("(document not stored)"),
        }
    }

    println!();
    if let Some(total) = value.get("total_hits").and_then(Value::as_u64) {
        println!("Total hits: {total}");
    }
    if let Some(duration) = value.get("duration_ms").and_then(Value::as_u64) {
        println!("Search time: {duration}ms");
    }
}

/// Output any flat result as `key: value` lines.
fn output_generic_human(value: &Value) {
    match value.as_object() {
        Some(obj) => {
            for (key, field) in obj {
                println!("{}: {}", humanize_key(key), format_value(field));
            }
        }
        None => println!("{}", format_value(value)),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &FoliumArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// `docs_per_second` -> `Docs per second`.
fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_humanize_key() {
        assert_eq!(humanize_key("docs_per_second"), "Docs per second");
        assert_eq!(humanize_key(""), "");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("apple")), "apple");
        assert_eq!(format_value(&json!(12)), "12");
        assert_eq!(format_value(&json!(0.5)), "0.50");
        assert_eq!(format_value(&json!(true)), "true");
    }
}
