//! Per-owner document summary.
//!
//! Used by `ridx stats` to show how much of an owner's upload history made
//! it into the index: counts by status and by kind, stored size, chunk
//! count, and when the last upload arrived.

use chrono::{DateTime, Utc};

use resume_index_core::models::{DocumentKind, DocumentStatus, OwnerId};
use resume_index_core::store::OwnerStats;

/// Render `stats` as the plain-text report printed by `ridx stats`.
pub fn render(owner: &OwnerId, stats: &OwnerStats, now: DateTime<Utc>) -> String {
    let title = format!("Documents for {owner}");
    let mut lines = vec![title.clone(), "=".repeat(title.chars().count()), String::new()];

    lines.push(format!("  Documents:   {}", stats.documents));
    lines.push(format!("  Size:        {}", format_bytes(stats.total_bytes)));
    lines.push(format!("  Chunks:      {}", stats.chunks));
    lines.push(format!("  Pending:     {}", stats.pending()));
    lines.push(format!(
        "  Last upload: {}",
        match stats.last_upload {
            Some(ts) => format_relative(ts, now),
            None => "never".to_string(),
        }
    ));

    let statuses: Vec<(DocumentStatus, usize)> = DocumentStatus::ALL
        .iter()
        .map(|s| (*s, stats.count(*s)))
        .filter(|(_, n)| *n > 0)
        .collect();
    if !statuses.is_empty() {
        lines.push(String::new());
        lines.push("  By status:".to_string());
        for (status, n) in statuses {
            lines.push(format!("  {:<14} {:>6}", status.as_str(), n));
        }
    }

    let kinds: Vec<(DocumentKind, usize)> = DocumentKind::ALL
        .iter()
        .map(|k| (*k, stats.count_kind(*k)))
        .filter(|(_, n)| *n > 0)
        .collect();
    if !kinds.is_empty() {
        lines.push(String::new());
        lines.push("  By kind:".to_string());
        for (kind, n) in kinds {
            lines.push(format!("  {:<14} {:>6}", kind.as_str(), n));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style, falling back to a date past thirty days.
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();
    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }
    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_relative() {
        let now = Utc::now();
        assert_eq!(format_relative(now, now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_relative(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(format_relative(now - Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_render_lists_only_present_statuses_and_kinds() {
        let now = Utc::now();
        let mut stats = OwnerStats {
            documents: 3,
            total_bytes: 4096,
            chunks: 7,
            last_upload: Some(now - Duration::hours(2)),
            ..OwnerStats::default()
        };
        stats.by_status.insert(DocumentStatus::Indexed, 2);
        stats.by_status.insert(DocumentStatus::Extracted, 1);
        stats.by_kind.insert(DocumentKind::Cv, 3);

        let report = render(&OwnerId::new("alice"), &stats, now);
        assert!(report.starts_with("Documents for alice\n==================="));
        assert!(report.contains("  Size:        4.0 KB"), "{report}");
        assert!(report.contains("  Chunks:      7"), "{report}");
        assert!(report.contains("  Pending:     1"), "{report}");
        assert!(report.contains("  Last upload: 2 hours ago"), "{report}");
        assert!(report.contains("indexed"));
        assert!(report.contains("extracted"));
        assert!(!report.contains("quarantined"));
        assert!(report.contains("cv"));
        assert!(!report.contains("cover_letter"));
    }
}
