use anyhow::{bail, Context, Result};
use geoforge::{ingest, IpVersion, MalformedPolicy, RecordSize, Trie, TrieOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::cli_utils::{format_bytes, format_number};

/// Set file permissions to read-only
fn set_readonly(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to get metadata for: {}", path.display()))?
        .permissions();

    #[cfg(unix)]
    {
        perms.set_mode(0o444); // r--r--r--
    }

    #[cfg(not(unix))]
    {
        perms.set_readonly(true);
    }

    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set read-only permissions: {}", path.display()))?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_build(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    protocol: u8,
    aliasing: bool,
    exclude_reserved: bool,
    database_type: String,
    description: Option<String>,
    desc_lang: String,
    record_size: Option<u16>,
    build_epoch: Option<u64>,
    threads: usize,
    skip_malformed: bool,
) -> Result<()> {
    let Some(ip_version) = IpVersion::from_number(u64::from(protocol)) else {
        bail!("Unsupported protocol {} (expected 4 or 6)", protocol);
    };

    let mut options = TrieOptions::new(ip_version)
        .with_ipv4_aliasing(aliasing)
        .with_reserved_networks(!exclude_reserved)
        .with_database_type(database_type);
    if let Some(desc) = description {
        options = options.with_description(desc_lang, desc);
    }
    if let Some(bits) = record_size {
        options = options.with_record_size(RecordSize::from_bits(bits)?);
    }
    if let Some(epoch) = build_epoch {
        options = options.with_build_epoch(epoch);
    }

    let files = ingest::expand_inputs(&inputs).context("Failed to list input files")?;
    if files.is_empty() {
        bail!("No input files found");
    }

    let workers = if threads == 0 {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        threads
    };
    let policy = if skip_malformed {
        MalformedPolicy::Skip
    } else {
        MalformedPolicy::Abort
    };

    log::info!(
        "Building IPv{} database from {} file(s) with {} worker(s)",
        ip_version.number(),
        files.len(),
        workers
    );
    log::debug!(
        "IPv4 aliasing: {}, reserved networks: {}",
        aliasing && ip_version == IpVersion::V6,
        if exclude_reserved { "excluded" } else { "included" }
    );

    let start = Instant::now();
    let mut trie = Trie::with_options(options);
    let stats = ingest::ingest_files(&files, workers, policy, |network, record| {
        trie.insert(network, record)
    })?;

    let written: u64 = stats.iter().map(|s| s.written).sum();
    let skipped: u64 = stats
        .iter()
        .map(|s| s.skipped_malformed + s.skipped_rejected)
        .sum();
    log::info!(
        "Inserted {} records ({} skipped) into {} nodes in {:.2?}",
        format_number(written as usize),
        format_number(skipped as usize),
        format_number(trie.node_count()),
        start.elapsed()
    );

    log::info!("Writing {}", output.display());
    let serialized = trie
        .serialize_to_path(&output)
        .with_context(|| format!("Failed to write database: {}", output.display()))?;

    set_readonly(&output)?;

    log::info!(
        "Wrote {} ({} nodes, {}-bit records, {} unique records, {} data section)",
        format_bytes(serialized.total_size as usize),
        format_number(serialized.node_count as usize),
        serialized.record_size as u16,
        format_number(serialized.unique_records),
        format_bytes(serialized.data_section_size)
    );

    Ok(())
}
