//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::attribute::positional::ComponentStatus;
use crate::cli::args::{OutputFormat, PosattrArgs};
use crate::error::{PosattrError, Result};

/// Result of deriving the uncompressed components.
#[derive(Debug, Serialize, Deserialize)]
pub struct MakeallResult {
    pub attribute: String,
    pub lexicon_size: usize,
    pub corpus_size: usize,
    pub created: Vec<String>,
    pub reversed_passes: Option<usize>,
}

/// Result of entropy-coding a token stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct HuffcodeResult {
    pub attribute: String,
    pub tokens: u64,
    pub compressed_bytes: u64,
    pub checkpoints: u64,
    pub bits_per_token: f64,
    pub validated: bool,
    pub deleted_uncompressed: bool,
}

/// Result of Golomb-coding a reversed index.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressRdxResult {
    pub attribute: String,
    pub ids: usize,
    pub entries: u64,
    pub compressed_bytes: u64,
    pub bits_per_entry: f64,
    pub validated: bool,
    pub deleted_uncompressed: bool,
}

/// Component overview of an attribute.
#[derive(Debug, Serialize)]
pub struct AttributeInfoResult {
    pub attribute: String,
    pub dir: String,
    pub components: Vec<ComponentStatus>,
}

/// Decoded tokens of a corpus range.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecodeResult {
    pub start: usize,
    pub tokens: Vec<String>,
}

/// Lexicon entry of a word.
#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResult {
    pub word: String,
    pub id: Option<u32>,
    pub frequency: u32,
    pub positions: Vec<u32>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PosattrArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &PosattrArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;

    if std::any::type_name::<T>().contains("AttributeInfoResult") {
        output_info_human(&value);
    } else if std::any::type_name::<T>().contains("DecodeResult") {
        output_decode_human(&value);
    } else {
        output_generic_human(&value);
    }
    Ok(())
}

/// Output the component table of an attribute.
fn output_info_human(value: &serde_json::Value) {
    if let Some(obj) = value.as_object() {
        if let Some(name) = obj.get("attribute").and_then(|a| a.as_str()) {
            println!("Attribute: {name}");
        }
        if let Some(dir) = obj.get("dir").and_then(|d| d.as_str()) {
            println!("Directory: {dir}");
        }
        println!();
        println!("{:<36} {:<10} {:>12}", "Component", "State", "Size");
        println!("{}", "─".repeat(60));

        if let Some(rows) = obj.get("components").and_then(|c| c.as_array()) {
            for row in rows {
                let name = row.get("name").and_then(|n| n.as_str()).unwrap_or("?");
                let state = row.get("state").and_then(|s| s.as_str()).unwrap_or("?");
                let size = row
                    .get("bytes")
                    .and_then(|b| b.as_u64())
                    .map(format_bytes)
                    .unwrap_or_else(|| "-".to_string());
                println!("{name:<36} {state:<10} {size:>12}");
            }
        }
    }
}

/// Output decoded tokens, one per line with their position.
fn output_decode_human(value: &serde_json::Value) {
    let start = value.get("start").and_then(|s| s.as_u64()).unwrap_or(0);
    if let Some(tokens) = value.get("tokens").and_then(|t| t.as_array()) {
        for (offset, token) in tokens.iter().enumerate() {
            println!("{:>10}\t{}", start + offset as u64, format_value(token));
        }
    }
}

/// Output generic data in human format.
fn output_generic_human(value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                let formatted_val = format_value(val);
                println!("{key}: {formatted_val}");
            }
        }
        _ => {
            let formatted_value = format_value(value);
            println!("{formatted_value}");
        }
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &PosattrArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Message printed for a failed command. Corruption and exceeded limits
/// leave a half-built component behind that has to be removed by hand.
pub fn format_error(error: &PosattrError) -> String {
    if error.is_fatal() {
        format!(
            "Fatal: {error}\nRemove any partially written component files before retrying."
        )
    } else {
        format!("Error: {error}")
    }
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

/// Format bytes into human-readable format.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index];
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}
