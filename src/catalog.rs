//! Static catalog of candidate items and the guard rules applied to them.
//!
//! The catalog is loaded once, validated, and then shared read-only through
//! [`CatalogHandle`]. A reload builds a complete new snapshot and swaps it in;
//! requests already holding the previous `Arc<Catalog>` keep using it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::answers::{Lang, LocalizedText};
use crate::signals::{default_intent_keywords, IntentTable};
use crate::text;

/// Penalty subtracted by the default guard. Large enough to push any item
/// below every unguarded one for realistic priors and weights.
pub const GUARD_PENALTY: f64 = 1e9;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog has no items")]
    Empty,
    #[error("duplicate catalog id: {0}")]
    DuplicateId(String),
    #[error("item {id}: {detail}")]
    InvalidPrior { id: String, detail: String },
    #[error("guard {id}: {detail}")]
    InvalidGuard { id: String, detail: String },
}

impl CatalogLoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Parse(_) => "parse",
            Self::Empty => "empty",
            Self::DuplicateId(_) => "duplicate_id",
            Self::InvalidPrior { .. } => "invalid_prior",
            Self::InvalidGuard { .. } => "invalid_guard",
        }
    }
}

// =============================================================================
// ITEMS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Bilingual list (core skills, progress cues).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedList {
    #[serde(default)]
    pub en: Vec<String>,
    #[serde(default)]
    pub ar: Vec<String>,
}

impl LocalizedList {
    pub fn get(&self, lang: Lang) -> &[String] {
        let (primary, secondary) = match lang {
            Lang::En => (&self.en, &self.ar),
            Lang::Ar => (&self.ar, &self.en),
        };
        if primary.is_empty() {
            secondary
        } else {
            primary
        }
    }
}

fn default_difficulty() -> u8 {
    2
}

/// Identity text used to build a card without the generation backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityTemplate {
    /// Identity name shown as the card title. Falls back to the item label.
    #[serde(default)]
    pub identity: LocalizedText,
    #[serde(default)]
    pub scene: LocalizedText,
    #[serde(default)]
    pub inner_sensation: LocalizedText,
    #[serde(default)]
    pub why_you: LocalizedText,
    #[serde(default)]
    pub first_week: LocalizedText,
    #[serde(default)]
    pub progress_markers: LocalizedList,
    #[serde(default)]
    pub win_condition: LocalizedText,
    #[serde(default)]
    pub core_skills: LocalizedList,
    #[serde(default)]
    pub mode: LocalizedText,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    /// Display label. Kept free of the item's id and aliases.
    pub label: String,
    #[serde(default)]
    pub prior: f64,
    #[serde(default)]
    pub trait_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub intent_boosts: BTreeMap<String, f64>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<IdentityTemplate>,
}

impl CatalogItem {
    /// Minimal item, used mostly by tests and programmatic catalogs.
    pub fn new(id: impl Into<String>, label: impl Into<String>, prior: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            prior,
            trait_weights: BTreeMap::new(),
            intent_boosts: BTreeMap::new(),
            risk_level: RiskLevel::Low,
            aliases: Vec::new(),
            template: None,
        }
    }

    pub fn with_weight(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.trait_weights.insert(name.into(), weight);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>, boost: f64) -> Self {
        self.intent_boosts.insert(intent.into(), boost);
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Card title for `lang`: the template identity when present, else the label.
    pub fn display_label(&self, lang: Lang) -> &str {
        match &self.template {
            Some(t) if !t.identity.is_empty() => t.identity.get(lang),
            _ => &self.label,
        }
    }

    /// Names that reveal the item: its id (underscore and spaced forms) and aliases.
    pub fn concealed_names(&self) -> Vec<String> {
        let mut names = vec![self.id.clone()];
        if self.id.contains('_') {
            names.push(self.id.replace('_', " "));
        }
        names.extend(self.aliases.iter().cloned());
        names.retain(|n| !n.trim().is_empty());
        names
    }
}

// =============================================================================
// GUARDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardCondition {
    #[serde(rename = "trait")]
    pub trait_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

impl GuardCondition {
    /// Evaluated against the request's trait strengths. Missing traits read as 0.
    pub fn holds(&self, strengths: &BTreeMap<String, f64>) -> bool {
        let value = strengths.get(&self.trait_name).copied().unwrap_or(0.0);
        let lower_ok = self.at_least.map_or(true, |t| value >= t);
        let upper_ok = self.below.map_or(true, |t| value < t);
        lower_ok && upper_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardTarget {
    RiskLevel(RiskLevel),
    Item(String),
}

fn default_guard_penalty() -> f64 {
    GUARD_PENALTY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardRule {
    pub id: String,
    pub condition: GuardCondition,
    #[serde(default = "default_guard_penalty")]
    pub penalty: f64,
    pub applies_to: Vec<GuardTarget>,
}

impl GuardRule {
    pub fn applies_to_item(&self, item: &CatalogItem) -> bool {
        self.applies_to.iter().any(|target| match target {
            GuardTarget::RiskLevel(level) => *level == item.risk_level,
            GuardTarget::Item(id) => *id == item.id,
        })
    }
}

pub fn default_guards() -> Vec<GuardRule> {
    vec![GuardRule {
        id: "anxiety_blocks_high_risk".to_string(),
        condition: GuardCondition {
            trait_name: "anxious".to_string(),
            at_least: Some(0.5),
            below: None,
        },
        penalty: GUARD_PENALTY,
        applies_to: vec![GuardTarget::RiskLevel(RiskLevel::High)],
    }]
}

// =============================================================================
// CATALOG
// =============================================================================

fn default_version() -> String {
    "1".to_string()
}

/// On-disk catalog format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default = "default_version")]
    pub version: String,
    pub items: Vec<CatalogItem>,
    /// Absent means the default guard list. An explicit empty list disables guards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guards: Option<Vec<GuardRule>>,
    #[serde(default, skip_serializing_if = "IntentTable::is_empty")]
    pub intent_keywords: IntentTable,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,
    items: Vec<CatalogItem>,
    guards: Vec<GuardRule>,
    intent_keywords: IntentTable,
    alias_map: BTreeMap<String, usize>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>, guards: Vec<GuardRule>) -> Result<Self, CatalogLoadError> {
        Self::from_file(CatalogFile {
            version: default_version(),
            items,
            guards: Some(guards),
            intent_keywords: IntentTable::new(),
        })
    }

    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogLoadError> {
        if file.items.is_empty() {
            return Err(CatalogLoadError::Empty);
        }

        let mut seen = BTreeSet::new();
        for item in &file.items {
            if item.id.trim().is_empty() {
                return Err(CatalogLoadError::InvalidPrior {
                    id: item.id.clone(),
                    detail: "empty id".to_string(),
                });
            }
            if !seen.insert(item.id.clone()) {
                return Err(CatalogLoadError::DuplicateId(item.id.clone()));
            }
            validate_item(item)?;
        }

        let guards = file.guards.unwrap_or_else(default_guards);
        for guard in &guards {
            validate_guard(guard, &seen)?;
        }

        let intent_keywords = if file.intent_keywords.is_empty() {
            default_intent_keywords()
        } else {
            file.intent_keywords
        };

        let mut alias_map = BTreeMap::new();
        for (idx, item) in file.items.iter().enumerate() {
            alias_map.insert(text::canon(&item.id.replace('_', " ")), idx);
        }
        // Aliases never shadow a real id.
        for (idx, item) in file.items.iter().enumerate() {
            for alias in &item.aliases {
                alias_map.entry(text::canon(alias)).or_insert(idx);
            }
        }

        Ok(Self {
            version: file.version,
            items: file.items,
            guards,
            intent_keywords,
            alias_map,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogLoadError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogLoadError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn to_file(&self) -> CatalogFile {
        CatalogFile {
            version: self.version.clone(),
            items: self.items.clone(),
            guards: Some(self.guards.clone()),
            intent_keywords: self.intent_keywords.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_file())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn guards(&self) -> &[GuardRule] {
        &self.guards
    }

    pub fn intent_keywords(&self) -> &IntentTable {
        &self.intent_keywords
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Resolve an id, spaced id or alias (any case or script variant) to an item.
    pub fn resolve(&self, name: &str) -> Option<&CatalogItem> {
        let key = text::canon(&name.replace('_', " "));
        self.alias_map.get(&key).map(|idx| &self.items[*idx])
    }

    /// Every id and alias across the catalog, deduplicated.
    pub fn concealed_names(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .items
            .iter()
            .flat_map(|i| i.concealed_names())
            .collect();
        set.into_iter().collect()
    }
}

fn validate_item(item: &CatalogItem) -> Result<(), CatalogLoadError> {
    let invalid = |detail: String| CatalogLoadError::InvalidPrior {
        id: item.id.clone(),
        detail,
    };
    if !item.prior.is_finite() {
        return Err(invalid(format!("prior is not finite: {}", item.prior)));
    }
    for (name, w) in item.trait_weights.iter().chain(item.intent_boosts.iter()) {
        if !w.is_finite() {
            return Err(invalid(format!("weight for {name} is not finite")));
        }
    }
    if let Some(t) = &item.template {
        if !(1..=5).contains(&t.difficulty) {
            return Err(invalid(format!("difficulty {} outside 1..=5", t.difficulty)));
        }
    }
    Ok(())
}

fn validate_guard(guard: &GuardRule, ids: &BTreeSet<String>) -> Result<(), CatalogLoadError> {
    let invalid = |detail: &str| CatalogLoadError::InvalidGuard {
        id: guard.id.clone(),
        detail: detail.to_string(),
    };
    if guard.condition.trait_name.trim().is_empty() {
        return Err(invalid("condition has no trait"));
    }
    if guard.condition.at_least.is_none() && guard.condition.below.is_none() {
        return Err(invalid("condition needs at_least or below"));
    }
    if !guard.penalty.is_finite() || guard.penalty <= 0.0 {
        return Err(invalid("penalty must be a positive finite number"));
    }
    if guard.applies_to.is_empty() {
        return Err(invalid("applies_to is empty"));
    }
    for target in &guard.applies_to {
        if let GuardTarget::Item(id) = target {
            if !ids.contains(id) {
                return Err(invalid(&format!("unknown item {id}")));
            }
        }
    }
    Ok(())
}

// =============================================================================
// HOT RELOAD
// =============================================================================

/// Shared, swappable catalog snapshot.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Snapshot for one request. Never changes underneath the caller.
    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, catalog: Catalog) {
        let next = Arc::new(catalog);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Load and validate `path`, then swap it in. On error the current snapshot stays.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<Arc<Catalog>, CatalogLoadError> {
        let path = path.as_ref();
        match Catalog::load(path) {
            Ok(catalog) => {
                info!(
                    path = %path.display(),
                    version = catalog.version(),
                    items = catalog.len(),
                    "catalog reloaded"
                );
                self.replace(catalog);
                Ok(self.snapshot())
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "catalog reload rejected; keeping previous snapshot");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads_and_validates() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.len() >= 16);
        assert_eq!(catalog.guards()[0].id, "anxiety_blocks_high_risk");
        assert!(catalog.intent_keywords().contains_key("stress_relief"));
    }

    #[test]
    fn test_resolve_by_alias_and_spaced_id() {
        let catalog = Catalog::new(
            vec![CatalogItem::new("tai_chi", "Slow Current", 0.1).with_alias("taichi")],
            vec![],
        )
        .unwrap();
        assert_eq!(catalog.resolve("Tai Chi").map(|i| i.id.as_str()), Some("tai_chi"));
        assert_eq!(catalog.resolve("TAICHI").map(|i| i.id.as_str()), Some("tai_chi"));
        assert!(catalog.resolve("fencing").is_none());
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(Catalog::new(vec![], vec![]), Err(CatalogLoadError::Empty)));
        let dup = Catalog::new(
            vec![CatalogItem::new("a", "A", 0.0), CatalogItem::new("a", "B", 0.0)],
            vec![],
        );
        assert!(matches!(dup, Err(CatalogLoadError::DuplicateId(id)) if id == "a"));
    }

    #[test]
    fn test_rejects_non_finite_prior() {
        let err = Catalog::new(vec![CatalogItem::new("a", "A", f64::NAN)], vec![]).unwrap_err();
        assert_eq!(err.code(), "invalid_prior");
    }

    #[test]
    fn test_rejects_guard_without_threshold() {
        let guard = GuardRule {
            id: "g".into(),
            condition: GuardCondition {
                trait_name: "anxious".into(),
                at_least: None,
                below: None,
            },
            penalty: GUARD_PENALTY,
            applies_to: vec![GuardTarget::RiskLevel(RiskLevel::High)],
        };
        let err = Catalog::new(vec![CatalogItem::new("a", "A", 0.0)], vec![guard]).unwrap_err();
        assert_eq!(err.code(), "invalid_guard");
    }

    #[test]
    fn test_missing_guards_field_means_defaults() {
        let catalog = Catalog::from_json(r#"{"items":[{"id":"a","label":"A"}]}"#).unwrap();
        assert_eq!(catalog.guards().len(), 1);
        let disabled = Catalog::from_json(r#"{"items":[{"id":"a","label":"A"}],"guards":[]}"#).unwrap();
        assert!(disabled.guards().is_empty());
    }

    #[test]
    fn test_guard_condition_bounds() {
        let cond = GuardCondition {
            trait_name: "anxious".into(),
            at_least: Some(0.5),
            below: None,
        };
        let mut s = BTreeMap::new();
        assert!(!cond.holds(&s));
        s.insert("anxious".to_string(), 0.5);
        assert!(cond.holds(&s));
    }

    #[test]
    fn test_guard_target_wire_format() {
        let json = serde_json::to_string(&GuardTarget::RiskLevel(RiskLevel::High)).unwrap();
        assert_eq!(json, r#"{"risk_level":"high"}"#);
    }

    #[test]
    fn test_handle_keeps_snapshot_on_bad_reload() {
        let handle = CatalogHandle::new(Catalog::new(vec![CatalogItem::new("a", "A", 0.0)], vec![]).unwrap());
        let before = handle.snapshot();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(handle.reload_from(&path).is_err());
        assert!(Arc::ptr_eq(&before, &handle.snapshot()));
    }
}
