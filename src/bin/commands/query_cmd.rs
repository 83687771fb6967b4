use anyhow::{Context, Result};
use geoforge::{reserved, Reader};
use serde_json::json;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli_utils::format_cidr;

pub fn cmd_query(database: PathBuf, query: String, quiet: bool) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let ip: IpAddr = query
        .parse()
        .with_context(|| format!("Not an IP address: {}", query))?;

    let result = reader
        .lookup(ip)
        .with_context(|| format!("Query failed for: {}", query))?;
    let found = result.is_some();

    if quiet {
        std::process::exit(if found { 0 } else { 1 });
    }

    match result {
        Some((data, prefix_len)) => {
            let mut result = data.to_json();
            if let serde_json::Value::Object(ref mut map) = result {
                map.insert("cidr".to_string(), json!(format_cidr(ip, prefix_len)));
                map.insert("prefix_len".to_string(), json!(prefix_len));
            }
            println!("{}", serde_json::to_string_pretty(&json!([result]))?);
        }
        None => {
            if reserved::is_reserved(ip) {
                log::info!("{} is in a reserved network", ip);
            }
            println!("[]");
        }
    }

    std::process::exit(if found { 0 } else { 1 });
}
