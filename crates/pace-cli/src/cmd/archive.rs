use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use pace_core::archive::{ArchiveManager, ArchiveOptions, ArchiveStatus, CleanupPolicy, Strategy};
use pace_core::config::Config;
use std::path::Path;
use std::time::Duration;

#[derive(Subcommand)]
pub enum ArchivesSubcommand {
    /// List archives, newest first
    List,

    /// Check each archive for missing or malformed files
    Validate,

    /// Delete old archives (preview unless --yes)
    Clean {
        /// Remove archives older than this many days
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Keep this many of the newest archives
        #[arg(long)]
        keep: Option<usize>,

        /// Actually delete; without this only the preview is shown
        #[arg(long)]
        yes: bool,
    },
}

fn manager(root: &Path) -> anyhow::Result<ArchiveManager> {
    let config = Config::load(root).context("failed to load config")?;
    Ok(ArchiveManager::with_cache_ttl(
        root,
        Duration::from_secs(config.archive.cache_ttl_secs),
    )
    .with_files(config.feature_file, config.progress_file))
}

// ---------------------------------------------------------------------------
// pace archive
// ---------------------------------------------------------------------------

pub fn archive(root: &Path, reason: &str, no_progress: bool, json: bool) -> anyhow::Result<()> {
    let manager = manager(root)?;
    let opts = ArchiveOptions {
        reason: reason.to_string(),
        include_progress: !no_progress,
    };
    let outcome = manager.archive(&opts).context("archive failed")?;

    if json {
        return print_json(&outcome);
    }

    if outcome.files.is_empty() && outcome.failed.is_empty() {
        println!("Nothing to archive.");
        return Ok(());
    }
    if let Some(dir) = &outcome.archive_dir {
        println!("Archive: {}", dir.display());
    }
    for file in &outcome.files {
        let how = match file.strategy {
            Strategy::Archive => "archived",
            Strategy::BackupCopy => "backed up",
        };
        println!("  {how:<10} {} -> {}", file.name, file.destination.display());
    }
    for name in &outcome.failed {
        println!("  {:<10} {name} (left in place)", "FAILED");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// pace archives ...
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ArchivesSubcommand, json: bool) -> anyhow::Result<()> {
    let manager = manager(root)?;
    match subcmd {
        ArchivesSubcommand::List => list(&manager, json),
        ArchivesSubcommand::Validate => validate(&manager, json),
        ArchivesSubcommand::Clean {
            older_than_days,
            keep,
            yes,
        } => clean(&manager, older_than_days, keep, yes, json),
    }
}

fn list(manager: &ArchiveManager, json: bool) -> anyhow::Result<()> {
    let entries = manager.list().context("failed to list archives")?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No archives.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.name.clone(),
                e.created
                    .map(|c| c.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["ARCHIVE", "CREATED (UTC)"], rows);
    Ok(())
}

fn validate(manager: &ArchiveManager, json: bool) -> anyhow::Result<()> {
    let entries = manager.list().context("failed to list archives")?;
    let checks: Vec<_> = entries.iter().map(|e| manager.validate(e)).collect();
    if json {
        return print_json(&checks);
    }
    if checks.is_empty() {
        println!("No archives.");
        return Ok(());
    }
    let rows = checks
        .iter()
        .map(|c| {
            let status = match c.status {
                ArchiveStatus::Valid => "valid",
                ArchiveStatus::Warning => "warning",
                ArchiveStatus::Invalid => "invalid",
            };
            vec![c.name.clone(), status.to_string(), c.problems.join("; ")]
        })
        .collect();
    print_table(&["ARCHIVE", "STATUS", "PROBLEMS"], rows);
    Ok(())
}

fn clean(
    manager: &ArchiveManager,
    older_than_days: Option<u32>,
    keep: Option<usize>,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    if older_than_days.is_none() && keep.is_none() {
        anyhow::bail!("specify --older-than-days and/or --keep");
    }
    let policy = CleanupPolicy {
        older_than: older_than_days.map(age_in_days).transpose()?,
        keep,
    };
    let plan = manager
        .plan_cleanup(&policy, chrono::Utc::now())
        .context("failed to plan cleanup")?;

    if json {
        if !yes {
            return print_json(&serde_json::json!({ "preview": true, "plan": plan }));
        }
        let removed = manager.cleanup(&plan).context("cleanup failed")?;
        return print_json(&serde_json::json!({
            "preview": false,
            "plan": plan,
            "removed": removed,
            "retained": plan.retained,
        }));
    }

    if plan.remove.is_empty() {
        println!("Nothing to remove ({} archive(s) kept).", plan.retained);
        return Ok(());
    }
    let verb = if yes { "Removing" } else { "Would remove" };
    println!("{verb} {} archive(s):", plan.remove.len());
    for entry in &plan.remove {
        println!("  {}", entry.name);
    }
    if !yes {
        println!("Re-run with --yes to delete.");
        return Ok(());
    }

    let removed = manager.cleanup(&plan).context("cleanup failed")?;
    println!(
        "Removed {} archive(s), kept {}.",
        removed.len(),
        plan.retained
    );
    Ok(())
}

fn age_in_days(days: u32) -> anyhow::Result<chrono::Duration> {
    chrono::Duration::try_days(i64::from(days))
        .with_context(|| format!("--older-than-days {days} is out of range"))
}
