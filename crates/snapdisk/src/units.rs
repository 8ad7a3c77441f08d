//! Byte-size argument parsing and human-readable formatting.
//!
//! Sizes accept an optional SI (`k`, `M`, `G`, `T`) or binary (`ki`,
//! `Mi`, `Gi`, `Ti`) suffix, with or without a separating space:
//! `"1048576"`, `"256Mi"`, `"10 Gi"`.

use anyhow::{bail, Result};

pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    if number.is_empty() {
        bail!("invalid size {text:?}: missing numeric part");
    }
    let value: u64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid size {text:?}: bad number"))?;
    let multiplier: u64 = match suffix.trim() {
        "" => 1,
        "k" | "K" => 1000,
        "M" => 1000 * 1000,
        "G" => 1000 * 1000 * 1000,
        "T" => 1000 * 1000 * 1000 * 1000,
        "ki" | "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        other => bail!("invalid size {text:?}: unknown suffix {other:?}"),
    };
    match value.checked_mul(multiplier) {
        Some(bytes) => Ok(bytes),
        None => bail!("invalid size {text:?}: out of range"),
    }
}

/// Render a byte count with one decimal, in powers of 1024 by default
/// or powers of 1000 when `si` is set.
pub fn format_size(bytes: u64, si: bool) -> String {
    let (base, units): (f64, [&str; 6]) = if si {
        (1000.0, ["B", "kB", "MB", "GB", "TB", "PB"])
    } else {
        (1024.0, ["B", "kiB", "MiB", "GiB", "TiB", "PiB"])
    };
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= base && unit < units.len() - 1 {
        value /= base;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", units[unit])
    }
}

pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}
