use std::fmt::Write;

use pace_core::feature::{Feature, Progress};
use pace_core::progress::ProgressLog;

/// Lines of the last progress-log session included as context.
pub const EXCERPT_LINES: usize = 12;

/// Build the session prompt for `feature`: what to implement, where the
/// project stands, and what the last session left behind.
pub fn build(feature: &Feature, progress: &Progress, log: &ProgressLog, feature_file: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Implement feature {}: {}", feature.id, feature.description);
    let _ = writeln!(out);
    let _ = writeln!(out, "Priority: {}", feature.priority_label());
    if !feature.category.is_empty() {
        let _ = writeln!(out, "Category: {}", feature.category);
    }
    if let Some(tags) = feature.tags.as_ref().filter(|t| !t.is_empty()) {
        let _ = writeln!(out, "Tags: {}", tags.join(", "));
    }

    if !feature.steps.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Verification steps:");
        for (i, step) in feature.steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {step}", i + 1);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Project progress: {}/{} features passing ({:.1}%).",
        progress.passing, progress.total, progress.percentage
    );

    let earlier = log.sessions_for(&feature.id);
    if !earlier.is_empty() {
        let numbers: Vec<String> = earlier.iter().map(|s| s.number.to_string()).collect();
        let _ = writeln!(
            out,
            "This feature was already attempted in session(s) {}; check the notes before starting over.",
            numbers.join(", ")
        );
    }

    let excerpt = log.recent_excerpt(EXCERPT_LINES);
    if !excerpt.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Most recent progress notes:");
        for line in excerpt {
            let _ = writeln!(out, "  {line}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Work on this feature only. When every step passes, set \"passes\": true for {} in {feature_file} \
         and append a \"### Session {} - {}\" entry to the progress log describing what changed.",
        feature.id,
        log.next_session_number(),
        feature.id
    );
    out
}
