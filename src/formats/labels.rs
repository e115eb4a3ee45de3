//! Human-readable labels for durations, view counts and sizes

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Maximum number of characters kept from a description
pub const DESCRIPTION_EXCERPT_CHARS: usize = 300;

/// `H:MM:SS` for an hour or more, otherwise `M:SS`
pub fn duration_label(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// `2.3M views`, `1.5K views` or `950 views`
pub fn views_label(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M views", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K views", count as f64 / 1_000.0)
    } else {
        format!("{} views", count)
    }
}

/// Size rounded to whole megabytes, or `Unknown`
pub fn size_label(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{}MB", (bytes as f64 / BYTES_PER_MB).round() as u64),
        None => "Unknown".to_string(),
    }
}

/// Audio quality from bitrate, or `Unknown`
pub fn bitrate_label(kbps: Option<u32>) -> String {
    match kbps {
        Some(kbps) => format!("{}kbps", kbps),
        None => "Unknown".to_string(),
    }
}

/// First few hundred characters of a description
pub fn description_excerpt(description: Option<&str>) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => {
            let excerpt: String = text.chars().take(DESCRIPTION_EXCERPT_CHARS).collect();
            format!("{}...", excerpt)
        }
        _ => "No description available".to_string(),
    }
}
