use crate::error::{PaceError, Result};
use crate::paths;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Feature priority. Unrecognised strings are kept verbatim so a round-trip
/// through the store never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Other(String),
}

impl Priority {
    /// Sort rank: lower runs first. Unknown priorities sort after `low`.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::Other(_) => 4,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Priority::Other(_))
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.as_str() {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            _ => Priority::Other(s),
        }
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Fields this crate doesn't model, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Feature {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            category: String::new(),
            description: description.into(),
            priority: Some(priority),
            steps: Vec::new(),
            passes: false,
            tags: None,
            extra: Map::new(),
        }
    }

    /// A missing priority ranks as `low`.
    pub fn priority_rank(&self) -> u8 {
        self.priority.as_ref().map_or(3, Priority::rank)
    }

    pub fn priority_label(&self) -> &str {
        self.priority.as_ref().map_or("low", Priority::as_str)
    }

    pub fn status(&self) -> Status {
        Status::from_passes(self.passes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passing,
    Failing,
}

impl Status {
    pub fn from_passes(passes: bool) -> Self {
        if passes {
            Status::Passing
        } else {
            Status::Failing
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passing => f.write_str("passing"),
            Status::Failing => f.write_str("failing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Derived cache over `features`. Never read as a source of truth; `save`
/// recomputes the counts from the live list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default)]
    pub total_features: usize,
    #[serde(default)]
    pub passing: usize,
    #[serde(default)]
    pub failing: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    fn recompute(&mut self, features: &[Feature]) {
        let passing = features.iter().filter(|f| f.passes).count();
        self.total_features = features.len();
        self.passing = passing;
        self.failing = features.len() - passing;
        self.last_updated = Some(Utc::now().to_rfc3339());
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub passing: usize,
    pub failing: usize,
    pub total: usize,
    /// `passing / total * 100`, one decimal place; `0.0` for an empty backlog.
    pub percentage: f64,
}

impl Progress {
    pub fn of(features: &[Feature]) -> Self {
        let total = features.len();
        let passing = features.iter().filter(|f| f.passes).count();
        let percentage = if total == 0 {
            0.0
        } else {
            (passing as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            passing,
            failing: total - passing,
            total,
            percentage,
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureList
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureList {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeatureList {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    pub fn find(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Failing features ordered by priority rank. The sort is stable, so
    /// equal ranks keep their array order.
    pub fn failing_features(&self) -> Vec<&Feature> {
        let mut failing: Vec<&Feature> = self.features.iter().filter(|f| !f.passes).collect();
        failing.sort_by_key(|f| f.priority_rank());
        failing
    }

    pub fn next_feature(&self) -> Option<&Feature> {
        self.failing_features().into_iter().next()
    }

    /// Vacuously true for an empty backlog.
    pub fn is_complete(&self) -> bool {
        self.features.iter().all(|f| f.passes)
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.features)
    }

    /// `(passing, total)` per category, sorted by category name.
    pub fn by_category(&self) -> BTreeMap<String, (usize, usize)> {
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for f in &self.features {
            let key = if f.category.is_empty() {
                "uncategorized".to_string()
            } else {
                f.category.clone()
            };
            let entry = counts.entry(key).or_default();
            if f.passes {
                entry.0 += 1;
            }
            entry.1 += 1;
        }
        counts
    }

    /// `(passing, total)` per priority label, in rank order.
    pub fn by_priority(&self) -> Vec<(String, usize, usize)> {
        let mut counts: BTreeMap<(u8, String), (usize, usize)> = BTreeMap::new();
        for f in &self.features {
            let entry = counts
                .entry((f.priority_rank(), f.priority_label().to_string()))
                .or_default();
            if f.passes {
                entry.0 += 1;
            }
            entry.1 += 1;
        }
        counts
            .into_iter()
            .map(|((_, label), (passing, total))| (label, passing, total))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// UpdateOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    pub changed: bool,
    pub feature_id: String,
    pub old_status: Status,
    pub new_status: Status,
    pub progress: Progress,
}

// ---------------------------------------------------------------------------
// FeatureStore
// ---------------------------------------------------------------------------

/// The backlog document on disk.
///
/// Every mutation is a full load → modify → save of the whole document. That
/// is only safe with a single writer; concurrent writers race and the last
/// save wins.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    path: PathBuf,
}

impl FeatureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default `feature_list.json` under `root`.
    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::feature_list_path(root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        paths::backup_path(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// An absent file is an empty backlog; an unparsable one is an error.
    pub fn load(&self) -> Result<FeatureList> {
        if !self.path.exists() {
            return Ok(FeatureList::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|source| PaceError::CorruptData {
            path: self.path.clone(),
            source,
        })
    }

    /// Recompute `list.metadata` from `list.features` and write the document.
    ///
    /// With `backup`, the current file is first copied to its `.bak` sibling.
    /// A failed backup is logged and ignored.
    pub fn save(&self, list: &mut FeatureList, backup: bool) -> Result<()> {
        if backup {
            self.write_backup();
        }
        list.metadata.recompute(&list.features);
        crate::io::write_json_pretty(&self.path, list)
    }

    fn load_document(&self) -> Result<Value> {
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|source| PaceError::CorruptData {
            path: self.path.clone(),
            source,
        })
    }

    fn write_backup(&self) {
        if !self.path.exists() {
            return;
        }
        let target = self.backup_path();
        if let Err(e) = std::fs::copy(&self.path, &target) {
            tracing::warn!(
                path = %target.display(),
                error = %e,
                "could not back up feature list; continuing without backup"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_failing_features(&self) -> Result<Vec<Feature>> {
        let list = self.load()?;
        Ok(list.failing_features().into_iter().cloned().collect())
    }

    pub fn get_next_feature(&self) -> Result<Option<Feature>> {
        let list = self.load()?;
        Ok(list.next_feature().cloned())
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.load()?.is_complete())
    }

    pub fn progress(&self) -> Result<Progress> {
        Ok(self.load()?.progress())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Set `passes` on one feature.
    ///
    /// When the feature already has the requested value nothing is written
    /// (no save, no backup) and `changed` is false. Otherwise the document is
    /// patched in place: only that feature's `passes` and the metadata counts
    /// change, and every other key keeps the value and order it was written
    /// with.
    pub fn update_feature_status(&self, id: &str, passes: bool) -> Result<UpdateOutcome> {
        let mut list = self.load()?;
        let index = list
            .features
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| PaceError::FeatureNotFound(id.to_string()))?;
        let feature = &mut list.features[index];

        let old_status = feature.status();
        let new_status = Status::from_passes(passes);
        if feature.passes == passes {
            return Ok(UpdateOutcome {
                changed: false,
                feature_id: id.to_string(),
                old_status,
                new_status,
                progress: list.progress(),
            });
        }

        feature.passes = passes;
        list.metadata.recompute(&list.features);
        let mut doc = self.load_document()?;
        patch_document(&mut doc, index, passes, &list.metadata);
        self.write_backup();
        crate::io::write_json_pretty(&self.path, &doc)?;
        tracing::debug!(feature_id = id, %old_status, %new_status, "feature status updated");

        Ok(UpdateOutcome {
            changed: true,
            feature_id: id.to_string(),
            old_status,
            new_status,
            progress: list.progress(),
        })
    }
}

/// Write a status change and fresh counts into the raw document.
fn patch_document(doc: &mut Value, index: usize, passes: bool, metadata: &Metadata) {
    if let Some(feature) = doc
        .get_mut("features")
        .and_then(|features| features.get_mut(index))
        .and_then(Value::as_object_mut)
    {
        feature.insert("passes".to_string(), Value::Bool(passes));
    }

    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let meta = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(meta) = meta.as_object_mut() {
        meta.insert("total_features".to_string(), metadata.total_features.into());
        meta.insert("passing".to_string(), metadata.passing.into());
        meta.insert("failing".to_string(), metadata.failing.into());
        if let Some(stamp) = &metadata.last_updated {
            meta.insert("last_updated".to_string(), stamp.clone().into());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
