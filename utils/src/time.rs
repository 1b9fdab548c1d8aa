//! Time formatting helpers.

/// Render a window length compactly, largest unit first, skipping zero parts:
/// `3600` → `1h`, `5400` → `1h 30m`, `259200` → `3d`.
pub fn format_duration(secs: u64) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

    if secs == 0 {
        return "0s".to_string();
    }
    let mut rest = secs;
    let mut parts = Vec::new();
    for (size, suffix) in UNITS {
        let count = rest / size;
        if count > 0 {
            parts.push(format!("{count}{suffix}"));
            rest %= size;
        }
    }
    parts.join(" ")
}
