use crate::output::{print_json, print_table};
use anyhow::Context;
use pace_core::config::Config;
use pace_core::validate::{validate_file, Issue};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let path = config.feature_path(root);
    let report = validate_file(&path);

    if json {
        print_json(&report)?;
    } else {
        if !report.errors.is_empty() {
            println!("Errors:");
            print_issues(&report.errors);
        }
        if !report.warnings.is_empty() {
            println!("Warnings:");
            print_issues(&report.warnings);
        }
        let s = &report.stats;
        if report.valid {
            println!(
                "{} is valid: {} feature(s), {} passing, {} failing",
                config.feature_file, s.total, s.passing, s.failing
            );
        }
    }

    if !report.valid {
        anyhow::bail!(
            "{} has {} error(s)",
            config.feature_file,
            report.errors.len()
        );
    }
    Ok(())
}

fn print_issues(issues: &[Issue]) {
    let rows = issues
        .iter()
        .map(|i| vec![i.feature_id.clone(), i.field.clone(), i.message.clone()])
        .collect();
    print_table(&["FEATURE", "FIELD", "MESSAGE"], rows);
    println!();
}
