//! Orchestrator-style quantity parsing (`50Mi`, `100m`, `2`, `1.5`, …).
//!
//! Every quantity-typed tunable accepts the full suffix grammar
//! (`Ki|Mi|Gi|k|M|G|m`) regardless of whether it ends up sized in bytes or
//! millicores — a memory quantity given in millicores or a CPU quantity
//! given in mebibytes is nonsensical but not this parser's job to reject;
//! it just converts whichever suffix is present into the caller's unit.
//! Kept as a standalone parser (rather than leaning on
//! `k8s_openapi::apimachinery::pkg::api::resource::Quantity`, which is a
//! transparent string newtype with no parsing of its own) so every
//! tunable in `MEMORY_MIN`/`CPU_MAX`/… round-trips through one place.

use anyhow::{anyhow, Result};

const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("k", 1000.0),
    ("M", 1_000_000.0),
    ("G", 1_000_000_000.0),
    ("m", 0.001),
];

fn parse_quantity(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("empty quantity"));
    }

    let (number, multiplier) = split_suffix(raw, SUFFIXES);

    let value: f64 = number
        .parse()
        .map_err(|_| anyhow!("not a number: {}", number))?;
    if value <= 0.0 {
        return Err(anyhow!("quantity must be > 0, got {}", value));
    }

    Ok(value * multiplier)
}

/// Parse a memory quantity string into bytes.
///
/// Accepts integer byte counts, and suffixes `Ki|Mi|Gi` (powers of 1024),
/// `k|M|G` (powers of 1000), or `m` (thousandths).
pub fn parse_memory_bytes(raw: &str) -> Result<u64> {
    Ok(parse_quantity(raw)?.round() as u64)
}

/// Parse a CPU quantity string into millicores.
///
/// Accepts a bare core count (`"2"`, `"0.5"`), a millicore count with the
/// `m` suffix (`"100m"`), or the `Ki|Mi|Gi|k|M|G` byte-style suffixes
/// scaled the same way a memory quantity would be, then expressed in
/// millicores.
pub fn parse_cpu_millicores(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("empty quantity"));
    }

    if let Some(number) = raw.strip_suffix('m') {
        let value: f64 = number
            .parse()
            .map_err(|_| anyhow!("not a number: {}", number))?;
        if value <= 0.0 {
            return Err(anyhow!("quantity must be > 0, got {}", value));
        }
        return Ok(value.round() as u64);
    }

    if raw.ends_with("Ki") || raw.ends_with("Mi") || raw.ends_with("Gi") || raw.ends_with('k') || raw.ends_with('M') || raw.ends_with('G') {
        let cores = parse_quantity(raw)?;
        return Ok((cores * 1000.0).round() as u64);
    }

    let value: f64 = raw
        .parse()
        .map_err(|_| anyhow!("not a number: {}", raw))?;
    if value <= 0.0 {
        return Err(anyhow!("quantity must be > 0, got {}", value));
    }
    Ok((value * 1000.0).round() as u64)
}

/// Pick the longest matching suffix among `suffixes` and split it off,
/// returning the bare numeric prefix and the corresponding multiplier (1.0
/// if no suffix matched).
fn split_suffix<'a>(raw: &'a str, suffixes: &[(&str, f64)]) -> (&'a str, f64) {
    let mut best: Option<(&str, f64)> = None;
    for (suffix, mult) in suffixes {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            if best.map(|(s, _)| s.len() < suffix.len()).unwrap_or(true) {
                best = Some((stripped, *mult));
            }
        }
    }
    best.unwrap_or((raw, 1.0))
}
