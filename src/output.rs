// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal rendering for query results and index status.
//!
//! Colors respect the NO_COLOR environment variable.

use colored::Colorize;

use crate::app::IndexStatus;
use crate::retrieval::QueryResult;
use crate::watcher::ScanSummary;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize note path (cyan)
pub fn colorize_path(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize distance (yellow)
pub fn colorize_distance(distance: f32, use_color: bool) -> String {
    let text = format!("{:.4}", distance);
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize passage text (dimmed)
pub fn colorize_passage(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// One block per hit: `id  distance`, then the indented passage.
pub fn render_hits(result: &QueryResult, use_color: bool) -> String {
    let mut out = String::new();
    for (rank, hit) in result.hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}  {}\n",
            rank + 1,
            colorize_path(&hit.id, use_color),
            colorize_distance(hit.distance, use_color)
        ));
        for line in hit.text.lines() {
            out.push_str("   ");
            out.push_str(&colorize_passage(line, use_color));
            out.push('\n');
        }
    }
    out
}

pub fn render_summary(summary: &ScanSummary, use_color: bool) -> String {
    let mark = if summary.failed == 0 { "✓" } else { "!" };
    let mark = match (use_color, summary.failed) {
        (false, _) => mark.to_string(),
        (true, 0) => mark.green().to_string(),
        (true, _) => mark.yellow().to_string(),
    };
    format!(
        "{} {} notes found: {} indexed, {} unchanged, {} failed",
        mark, summary.found, summary.indexed, summary.unchanged, summary.failed
    )
}

pub fn render_status(status: &IndexStatus, use_color: bool) -> String {
    let dimension = status
        .dimension
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    [
        format!("vault:      {}", colorize_path(&status.vault.display().to_string(), use_color)),
        format!("database:   {}", status.database.display()),
        format!("collection: {}", status.collection),
        format!("model:      {}", status.model),
        format!("dimension:  {}", dimension),
        format!("documents:  {}", status.documents),
        format!("entries:    {}", status.entries),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChunkMetadata, QueryHit};

    #[test]
    fn hits_render_without_color() {
        let result = QueryResult {
            hits: vec![QueryHit {
                id: "notes/a.md_chunk_0".into(),
                text: "Battery life matters.".into(),
                metadata: ChunkMetadata {
                    source: "notes/a.md".into(),
                    chunk: 0,
                    modified: 0,
                },
                distance: 0.25,
            }],
        };
        assert_eq!(
            render_hits(&result, false),
            "1. notes/a.md_chunk_0  0.2500\n   Battery life matters.\n"
        );
    }

    #[test]
    fn summary_mentions_failures() {
        let summary = ScanSummary {
            found: 3,
            indexed: 1,
            unchanged: 1,
            failed: 1,
        };
        assert_eq!(
            render_summary(&summary, false),
            "! 3 notes found: 1 indexed, 1 unchanged, 1 failed"
        );
    }
}
