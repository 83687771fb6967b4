use anyhow::{Context, Result};
use geoforge::{DataValue, Reader};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_number, format_unix_timestamp};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let metadata = reader
        .metadata()
        .with_context(|| format!("Failed to decode metadata: {}", database.display()))?;
    let header = reader.header();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "size": reader.as_bytes().len(),
            "search_tree_size": header.tree_size,
            "metadata": metadata.to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let text = |key: &str| metadata.get(key).and_then(DataValue::as_str).unwrap_or("");
    let number = |key: &str| metadata.get(key).and_then(DataValue::as_u64);

    println!("Database: {}", database.display());
    println!("Size:     {}", format_bytes(reader.as_bytes().len()));
    println!();
    println!("Metadata:");
    println!("  Database type:   {}", text("database_type"));
    if let Some(epoch) = number("build_epoch") {
        println!("  Build time:      {} ({})", format_unix_timestamp(epoch), epoch);
    }
    println!(
        "  Format version:  {}.{}",
        number("binary_format_major_version").unwrap_or(0),
        number("binary_format_minor_version").unwrap_or(0)
    );
    println!("  IP version:      IPv{}", header.ip_version.number());
    println!(
        "  IPv4 aliasing:   {}",
        matches!(metadata.get("ipv4_aliasing"), Some(DataValue::Bool(true)))
    );
    println!("  Node count:      {}", format_number(header.node_count as usize));
    println!("  Record size:     {} bits", header.record_size as u16);
    println!("  Search tree:     {}", format_bytes(header.tree_size));

    if let Some(DataValue::Array(languages)) = metadata.get("languages") {
        let languages: Vec<&str> = languages.iter().filter_map(DataValue::as_str).collect();
        if !languages.is_empty() {
            println!("  Languages:       {}", languages.join(", "));
        }
    }

    if let Some(descriptions) = metadata.get("description").and_then(DataValue::as_map) {
        if !descriptions.is_empty() {
            println!("  Description:");
            for (lang, desc) in descriptions {
                println!("    {}: {}", lang, desc.as_str().unwrap_or(""));
            }
        }
    }

    Ok(())
}
