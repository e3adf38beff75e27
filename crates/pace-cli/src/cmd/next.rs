use crate::output::print_json;
use anyhow::Context;
use pace_core::config::Config;
use pace_core::feature::FeatureStore;
use std::path::Path;

pub fn run(root: &Path, id_only: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = FeatureStore::new(config.feature_path(root));
    let list = store.load().context("failed to load feature list")?;
    let progress = list.progress();

    let Some(feature) = list.next_feature() else {
        if json {
            print_json(&serde_json::json!({ "complete": true, "progress": progress }))?;
        } else if !id_only {
            println!(
                "All features passing ({}/{}).",
                progress.passing, progress.total
            );
        }
        return Ok(());
    };

    if json {
        print_json(&serde_json::json!({
            "complete": false,
            "feature": feature,
            "progress": progress,
        }))?;
    } else if id_only {
        println!("{}", feature.id);
    } else {
        println!("Feature:   {}", feature.id);
        println!("Priority:  {}", feature.priority_label());
        if !feature.category.is_empty() {
            println!("Category:  {}", feature.category);
        }
        println!("About:     {}", feature.description);
        if !feature.steps.is_empty() {
            println!("Steps:");
            for (i, step) in feature.steps.iter().enumerate() {
                println!("  {}. {step}", i + 1);
            }
        }
        println!(
            "Progress:  {}/{} passing ({:.1}%)",
            progress.passing, progress.total, progress.percentage
        );
    }

    Ok(())
}
