use crate::output::print_json;
use anyhow::Context;
use clap::ValueEnum;
use pace_core::config::Config;
use pace_core::feature::FeatureStore;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pass,
    Fail,
}

pub fn run(root: &Path, id: &str, status: StatusArg, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = FeatureStore::new(config.feature_path(root));
    let outcome = store
        .update_feature_status(id, status == StatusArg::Pass)
        .with_context(|| format!("failed to update feature '{id}'"))?;

    if json {
        return print_json(&outcome);
    }

    if outcome.changed {
        println!(
            "{}: {} -> {}",
            outcome.feature_id, outcome.old_status, outcome.new_status
        );
    } else {
        println!("{} is already {}", outcome.feature_id, outcome.new_status);
    }
    let p = &outcome.progress;
    println!(
        "Progress: {}/{} passing ({:.1}%)",
        p.passing, p.total, p.percentage
    );
    Ok(())
}
