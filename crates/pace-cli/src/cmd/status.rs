use crate::output::{print_json, print_table};
use anyhow::Context;
use pace_core::config::Config;
use pace_core::feature::{FeatureStore, Progress};
use pace_core::progress::ProgressLog;
use serde::Serialize;
use std::path::Path;

const NEXT_LIMIT: usize = 5;
const EXCERPT_LINES: usize = 8;

#[derive(Serialize)]
struct NextEntry {
    id: String,
    priority: String,
    category: String,
    description: String,
}

#[derive(Serialize)]
struct CategoryCount {
    name: String,
    passing: usize,
    total: usize,
}

#[derive(Serialize)]
struct StatusReport {
    project_name: Option<String>,
    progress: Progress,
    complete: bool,
    next: Vec<NextEntry>,
    last_session: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    by_category: Vec<CategoryCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    by_priority: Vec<CategoryCount>,
}

pub fn run(root: &Path, verbose: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = FeatureStore::new(config.feature_path(root));
    if !store.exists() {
        anyhow::bail!(
            "no {} in {}; nothing to report",
            config.feature_file,
            root.display()
        );
    }
    let list = store.load().context("failed to load feature list")?;
    let log = ProgressLog::load(&config.progress_path(root)).context("failed to read progress log")?;

    let next = list
        .failing_features()
        .into_iter()
        .take(NEXT_LIMIT)
        .map(|f| NextEntry {
            id: f.id.clone(),
            priority: f.priority_label().to_string(),
            category: f.category.clone(),
            description: f.description.clone(),
        })
        .collect();

    let (by_category, by_priority) = if verbose {
        let categories = list
            .by_category()
            .into_iter()
            .map(|(name, (passing, total))| CategoryCount {
                name,
                passing,
                total,
            })
            .collect();
        let priorities = list
            .by_priority()
            .into_iter()
            .map(|(name, passing, total)| CategoryCount {
                name,
                passing,
                total,
            })
            .collect();
        (categories, priorities)
    } else {
        (Vec::new(), Vec::new())
    };

    let report = StatusReport {
        project_name: list.metadata.project_name.clone(),
        progress: list.progress(),
        complete: list.is_complete(),
        next,
        last_session: log.recent_excerpt(EXCERPT_LINES),
        by_category,
        by_priority,
    };

    if json {
        return print_json(&report);
    }

    if let Some(name) = &report.project_name {
        println!("Project:   {name}");
    }
    let p = &report.progress;
    println!(
        "Progress:  {}/{} passing ({:.1}%), {} failing",
        p.passing, p.total, p.percentage, p.failing
    );

    if report.complete {
        println!("\nAll features passing.");
    } else {
        println!("\nNext up:");
        let rows = report
            .next
            .iter()
            .map(|n| {
                vec![
                    n.id.clone(),
                    n.priority.clone(),
                    n.category.clone(),
                    n.description.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "PRIORITY", "CATEGORY", "DESCRIPTION"], rows);
    }

    if !report.last_session.is_empty() {
        println!("\nLast session:");
        for line in &report.last_session {
            println!("  {line}");
        }
    }

    if verbose {
        println!("\nBy category:");
        print_counts(&report.by_category);
        println!("\nBy priority:");
        print_counts(&report.by_priority);
    }

    Ok(())
}

fn print_counts(counts: &[CategoryCount]) {
    let rows = counts
        .iter()
        .map(|c| vec![c.name.clone(), format!("{}/{}", c.passing, c.total)])
        .collect();
    print_table(&["NAME", "PASSING"], rows);
}
