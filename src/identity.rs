//! # Run Identity Resolution
//!
//! Works out which routing algorithm, traffic pattern, and injection rate a
//! traffic log belongs to. Sweeps are usually laid out as
//!
//! ```text
//! results/<algorithm>/<pattern>/rate<r>/TrafficInformation.csv
//! ```
//!
//! but older runs only carry this information in the `config.toml` the
//! simulator was started with. Both sources are evaluated by the same ordered
//! rule list, built from a [`LabelRegistry`]:
//!
//! 1. Path segments are scanned in order; the first match per field wins.
//! 2. Only if a field is still unresolved is the companion configuration
//!    read, and only unresolved fields are filled from it.
//! 3. Anything left over defaults to `"Unknown"` or a rate of 0.

use crate::error::AnalysisError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tracing::debug;

/// Label used for an algorithm or pattern that could not be resolved
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Fields that make up a run identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityField {
    Algorithm,
    TrafficPattern,
    InjectionRate,
}

/// Where a resolved identity field came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentitySource {
    Path,
    Config,
    #[default]
    Default,
}

/// A recognized spelling and the canonical label it maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAlias {
    pub alias: String,
    pub label: String,
    /// Only match whole path segments, never free configuration text
    #[serde(default)]
    pub segment_only: bool,
}

impl LabelAlias {
    pub fn new(alias: &str, label: &str) -> Self {
        Self {
            alias: alias.to_string(),
            label: label.to_string(),
            segment_only: false,
        }
    }

    /// An alias too generic to search for inside configuration text
    pub fn segment_only(alias: &str, label: &str) -> Self {
        Self {
            segment_only: true,
            ..Self::new(alias, label)
        }
    }
}

/// Whitelist of recognized algorithm and traffic-pattern labels.
///
/// Configuration text is first searched for an explicit assignment such as
/// `traffic_pattern = "permutation"` under one of the configured keys. Only
/// if none names a known label is the text scanned for aliases, where order
/// matters and the first alias found wins. The registry can be extended from a JSON file so new routing
/// algorithms need no code change:
///
/// ```json
/// {
///   "algorithms": [{ "alias": "WEST_FIRST", "label": "WEST_FIRST" }],
///   "traffic_patterns": [{ "alias": "transpose", "label": "transpose" }],
///   "rate_keys": ["injection_rate"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRegistry {
    pub algorithms: Vec<LabelAlias>,
    pub traffic_patterns: Vec<LabelAlias>,
    /// Configuration keys naming the routing algorithm
    pub algorithm_keys: Vec<String>,
    /// Configuration keys naming the traffic pattern
    pub pattern_keys: Vec<String>,
    /// Configuration keys assigning the injection rate
    pub rate_keys: Vec<String>,
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self {
            algorithms: ["DOR", "ROMM", "MAD", "VAL", "ODD_EVEN"]
                .iter()
                .map(|name| LabelAlias::new(name, name))
                .collect(),
            traffic_patterns: vec![
                LabelAlias::new("random uniform", "random uniform"),
                LabelAlias::segment_only("random_uniform", "random uniform"),
                LabelAlias::segment_only("random-uniform", "random uniform"),
                LabelAlias::segment_only("random", "random uniform"),
                LabelAlias::new("permutation", "permutation"),
            ],
            algorithm_keys: vec!["algorithm".to_string(), "routing_algorithm".to_string()],
            pattern_keys: vec!["traffic_pattern".to_string(), "trafficPattern".to_string()],
            rate_keys: vec!["injectionRate".to_string(), "injection_rate".to_string()],
        }
    }
}

impl LabelRegistry {
    /// Load a registry from a JSON file; omitted sections keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| AnalysisError::InvalidRegistry {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved identity of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub algorithm: String,
    pub traffic_pattern: String,
    pub injection_rate: f64,
    pub provenance: IdentityProvenance,
}

/// Per-field origin of a [`RunIdentity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityProvenance {
    pub algorithm: IdentitySource,
    pub traffic_pattern: IdentitySource,
    pub injection_rate: IdentitySource,
}

impl RunIdentity {
    /// Identity with explicit values, as if read from the path
    pub fn new(algorithm: &str, traffic_pattern: &str, injection_rate: f64) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            traffic_pattern: traffic_pattern.to_string(),
            injection_rate,
            provenance: IdentityProvenance {
                algorithm: IdentitySource::Path,
                traffic_pattern: IdentitySource::Path,
                injection_rate: IdentitySource::Path,
            },
        }
    }
}

/// How an input is being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// A single path segment, matched whole
    Segment,
    /// Free configuration text, matched by substring or assignment
    Text,
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Label(String),
    Rate(f64),
}

#[derive(Debug)]
enum Extractor {
    Alias(Vec<LabelAlias>),
    /// `key = "value"` in configuration text, value matched against aliases
    LabelAssignment(Regex, Vec<LabelAlias>),
    RateSegment,
    RateAssignment(Regex),
}

impl Extractor {
    fn extract(&self, input: &str, scope: Scope) -> Option<FieldValue> {
        match (self, scope) {
            (Extractor::Alias(aliases), Scope::Segment) => aliases
                .iter()
                .find(|a| a.alias.eq_ignore_ascii_case(input))
                .map(|a| FieldValue::Label(a.label.clone())),
            (Extractor::Alias(aliases), Scope::Text) => aliases
                .iter()
                .filter(|a| !a.segment_only)
                .find(|a| input.contains(a.alias.as_str()))
                .map(|a| FieldValue::Label(a.label.clone())),
            (Extractor::LabelAssignment(pattern, aliases), Scope::Text) => pattern
                .captures_iter(input)
                .filter_map(|caps| caps.get(1))
                .find_map(|value| {
                    let value = value.as_str().trim();
                    aliases.iter().find(|a| a.alias.eq_ignore_ascii_case(value))
                })
                .map(|a| FieldValue::Label(a.label.clone())),
            (Extractor::RateSegment, Scope::Segment) => rate_from_segment(input).map(FieldValue::Rate),
            (Extractor::RateAssignment(pattern), Scope::Text) => pattern
                .captures(input)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|rate| rate.is_finite())
                .map(FieldValue::Rate),
            _ => None,
        }
    }
}

/// Extract a rate from a segment such as `rate0.25` or `injection_rate_0.1`
fn rate_from_segment(segment: &str) -> Option<f64> {
    let lowered = segment.to_lowercase();
    if !lowered.contains("rate") && !lowered.contains("injection") {
        return None;
    }
    let stripped = lowered
        .replace("rate", "")
        .replace("injection", "")
        .replace('_', "");
    stripped
        .parse::<f64>()
        .ok()
        .filter(|rate| rate.is_finite() && *rate >= 0.0)
}

#[derive(Debug)]
struct IdentityRule {
    field: IdentityField,
    extractor: Extractor,
}

/// Partially resolved identity while rules are being applied
#[derive(Debug, Default)]
struct Resolution {
    algorithm: Option<(String, IdentitySource)>,
    traffic_pattern: Option<(String, IdentitySource)>,
    injection_rate: Option<(f64, IdentitySource)>,
}

impl Resolution {
    fn is_resolved(&self, field: IdentityField) -> bool {
        match field {
            IdentityField::Algorithm => self.algorithm.is_some(),
            IdentityField::TrafficPattern => self.traffic_pattern.is_some(),
            IdentityField::InjectionRate => self.injection_rate.is_some(),
        }
    }

    fn is_complete(&self) -> bool {
        self.algorithm.is_some() && self.traffic_pattern.is_some() && self.injection_rate.is_some()
    }

    fn set(&mut self, field: IdentityField, value: FieldValue, source: IdentitySource) {
        match (field, value) {
            (IdentityField::Algorithm, FieldValue::Label(label)) => {
                self.algorithm = Some((label, source));
            }
            (IdentityField::TrafficPattern, FieldValue::Label(label)) => {
                self.traffic_pattern = Some((label, source));
            }
            (IdentityField::InjectionRate, FieldValue::Rate(rate)) => {
                self.injection_rate = Some((rate, source));
            }
            _ => {}
        }
    }

    fn finish(self) -> RunIdentity {
        let (algorithm, algorithm_source) = self
            .algorithm
            .unwrap_or_else(|| (UNKNOWN_LABEL.to_string(), IdentitySource::Default));
        let (traffic_pattern, pattern_source) = self
            .traffic_pattern
            .unwrap_or_else(|| (UNKNOWN_LABEL.to_string(), IdentitySource::Default));
        let (injection_rate, rate_source) = self
            .injection_rate
            .unwrap_or((0.0, IdentitySource::Default));

        RunIdentity {
            algorithm,
            traffic_pattern,
            injection_rate,
            provenance: IdentityProvenance {
                algorithm: algorithm_source,
                traffic_pattern: pattern_source,
                injection_rate: rate_source,
            },
        }
    }
}

fn key_alternation(keys: &[String]) -> String {
    keys.iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: String) -> Result<Regex, AnalysisError> {
    Regex::new(&pattern).map_err(|source| AnalysisError::InvalidPattern { pattern, source })
}

/// Line-anchored `key = value` matcher; the value may be quoted
fn label_assignment(keys: &[String]) -> Result<Option<Regex>, AnalysisError> {
    if keys.is_empty() {
        return Ok(None);
    }
    let pattern = format!(
        r#"(?m)^[ \t]*(?:{})[ \t]*=[ \t]*"?([^"\r\n#]*)"?"#,
        key_alternation(keys)
    );
    compile(pattern).map(Some)
}

/// Applies the identity rules derived from a [`LabelRegistry`]
#[derive(Debug)]
pub struct IdentityResolver {
    rules: Vec<IdentityRule>,
}

impl IdentityResolver {
    /// Build the ordered rule list for a registry
    pub fn new(registry: &LabelRegistry) -> Result<Self, AnalysisError> {
        let mut rules = Vec::new();
        if let Some(regex) = label_assignment(&registry.algorithm_keys)? {
            rules.push(IdentityRule {
                field: IdentityField::Algorithm,
                extractor: Extractor::LabelAssignment(regex, registry.algorithms.clone()),
            });
        }
        if let Some(regex) = label_assignment(&registry.pattern_keys)? {
            rules.push(IdentityRule {
                field: IdentityField::TrafficPattern,
                extractor: Extractor::LabelAssignment(regex, registry.traffic_patterns.clone()),
            });
        }

        rules.extend([
            IdentityRule {
                field: IdentityField::Algorithm,
                extractor: Extractor::Alias(registry.algorithms.clone()),
            },
            IdentityRule {
                field: IdentityField::TrafficPattern,
                extractor: Extractor::Alias(registry.traffic_patterns.clone()),
            },
            IdentityRule {
                field: IdentityField::InjectionRate,
                extractor: Extractor::RateSegment,
            },
        ]);

        if !registry.rate_keys.is_empty() {
            let pattern = format!(r"(?:{})\s*=\s*([0-9.]+)", key_alternation(&registry.rate_keys));
            let regex = compile(pattern)?;
            rules.push(IdentityRule {
                field: IdentityField::InjectionRate,
                extractor: Extractor::RateAssignment(regex),
            });
        }

        Ok(Self { rules })
    }

    fn apply(&self, input: &str, scope: Scope, source: IdentitySource, resolution: &mut Resolution) {
        for rule in &self.rules {
            if resolution.is_resolved(rule.field) {
                continue;
            }
            if let Some(value) = rule.extractor.extract(input, scope) {
                resolution.set(rule.field, value, source);
            }
        }
    }

    fn resolve_path(&self, log_path: &Path) -> Resolution {
        let mut resolution = Resolution::default();
        for component in log_path.components() {
            if let Component::Normal(segment) = component {
                self.apply(
                    &segment.to_string_lossy(),
                    Scope::Segment,
                    IdentitySource::Path,
                    &mut resolution,
                );
            }
        }
        resolution
    }

    /// Resolve an identity from a log path and optional configuration text.
    pub fn identify(&self, log_path: &Path, config_text: Option<&str>) -> RunIdentity {
        let mut resolution = self.resolve_path(log_path);
        if !resolution.is_complete() {
            if let Some(text) = config_text {
                self.apply(text, Scope::Text, IdentitySource::Config, &mut resolution);
            }
        }
        resolution.finish()
    }

    /// Resolve an identity, reading the companion `config.toml` next to the
    /// log only when the path leaves a field unresolved.
    pub fn identify_run(&self, log_path: &Path) -> RunIdentity {
        let mut resolution = self.resolve_path(log_path);
        if !resolution.is_complete() {
            let config_path = log_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(crate::defaults::CONFIG_FILE);
            if config_path.is_file() {
                match std::fs::read_to_string(&config_path) {
                    Ok(text) => {
                        self.apply(&text, Scope::Text, IdentitySource::Config, &mut resolution)
                    }
                    Err(e) => debug!("Could not read {:?}: {}", config_path, e),
                }
            }
        }
        resolution.finish()
    }
}

/// Resolve an identity with the default label registry
pub fn identify(log_path: &Path, config_text: Option<&str>) -> Result<RunIdentity, AnalysisError> {
    let resolver = IdentityResolver::new(&LabelRegistry::default())?;
    Ok(resolver.identify(log_path, config_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(&LabelRegistry::default()).unwrap()
    }

    #[test]
    fn test_identity_from_path_segments() {
        let path = Path::new("results/DOR/random_uniform/rate0.25/TrafficInformation.csv");
        let identity = resolver().identify(path, None);

        assert_eq!(identity.algorithm, "DOR");
        assert_eq!(identity.traffic_pattern, "random uniform");
        assert_eq!(identity.injection_rate, 0.25);
        assert_eq!(identity.provenance.algorithm, IdentitySource::Path);
        assert_eq!(identity.provenance.injection_rate, IdentitySource::Path);
    }

    #[test]
    fn test_path_takes_precedence_over_config() {
        let path = Path::new("sweep/ROMM/injection_rate_0.1/TrafficInformation.csv");
        let config = "[routing]\nalgorithm = \"DOR\"\n[traffic]\ninjection_rate = 0.4\ntraffic_pattern = \"permutation\"\n";
        let identity = resolver().identify(path, Some(config));

        assert_eq!(identity.algorithm, "ROMM");
        assert_eq!(identity.injection_rate, 0.1);
        assert_eq!(identity.traffic_pattern, "permutation");
        assert_eq!(identity.provenance.traffic_pattern, IdentitySource::Config);
    }

    #[test]
    fn test_first_segment_wins() {
        let path = Path::new("MAD/VAL/rate0.1/rate0.2/TrafficInformation.csv");
        let identity = resolver().identify(path, None);

        assert_eq!(identity.algorithm, "MAD");
        assert_eq!(identity.injection_rate, 0.1);
    }

    #[test]
    fn test_config_rate_assignment_camel_case() {
        let identity = resolver().identify(
            Path::new("run1/TrafficInformation.csv"),
            Some("algorithm = ODD_EVEN\ninjectionRate = 0.35\n"),
        );

        assert_eq!(identity.algorithm, "ODD_EVEN");
        assert_eq!(identity.injection_rate, 0.35);
        assert_eq!(identity.traffic_pattern, UNKNOWN_LABEL);
        assert_eq!(identity.provenance.traffic_pattern, IdentitySource::Default);
    }

    #[test]
    fn test_generic_random_alias_ignored_in_config_text() {
        let identity = resolver().identify(
            Path::new("run/TrafficInformation.csv"),
            Some("# randomized seed\ntraffic = permutation\ninjection_rate = 0.2\n"),
        );

        assert_eq!(identity.traffic_pattern, "permutation");
        assert_eq!(identity.provenance.traffic_pattern, IdentitySource::Config);
    }

    #[test]
    fn test_pattern_assignment_beats_other_keys() {
        let config = "[traffic]\npacket_size_option = \"random uniform\"\ninjection_rate = 0.2\ntraffic_pattern = \"permutation\"\n";
        let identity = resolver().identify(Path::new("run/TrafficInformation.csv"), Some(config));

        assert_eq!(identity.traffic_pattern, "permutation");
        assert_eq!(identity.injection_rate, 0.2);
    }

    #[test]
    fn test_algorithm_assignment_with_comment() {
        let config = "[routing]\nalgorithm = \"MAD\"  # was DOR\n";
        let identity = resolver().identify(Path::new("run/TrafficInformation.csv"), Some(config));

        assert_eq!(identity.algorithm, "MAD");
    }

    #[test]
    fn test_generic_alias_still_matches_path_segment() {
        let identity =
            resolver().identify(Path::new("DOR/random/rate0.1/TrafficInformation.csv"), None);
        assert_eq!(identity.traffic_pattern, "random uniform");
    }

    #[test]
    fn test_unresolved_fields_default() {
        let identity = resolver().identify(Path::new("out/TrafficInformation.csv"), None);

        assert_eq!(identity.algorithm, UNKNOWN_LABEL);
        assert_eq!(identity.traffic_pattern, UNKNOWN_LABEL);
        assert_eq!(identity.injection_rate, 0.0);
    }

    #[test]
    fn test_rate_segment_parsing() {
        assert_eq!(rate_from_segment("rate0.25"), Some(0.25));
        assert_eq!(rate_from_segment("Rate_0.5"), Some(0.5));
        assert_eq!(rate_from_segment("injection_rate_0.05"), Some(0.05));
        assert_eq!(rate_from_segment("generate"), None);
        assert_eq!(rate_from_segment("0.25"), None);
    }

    #[test]
    fn test_identify_run_reads_companion_config() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run7");
        std::fs::create_dir_all(&run).unwrap();
        std::fs::write(
            run.join(crate::defaults::CONFIG_FILE),
            "[routing]\nalgorithm = \"VAL\"\n[traffic]\ninjection_rate = 0.15\ntraffic_pattern = \"random uniform\"\n",
        )
        .unwrap();

        let identity = resolver().identify_run(&run.join(crate::defaults::TRAFFIC_LOG_FILE));
        assert_eq!(identity.algorithm, "VAL");
        assert_eq!(identity.traffic_pattern, "random uniform");
        assert_eq!(identity.injection_rate, 0.15);
        assert_eq!(identity.provenance.algorithm, IdentitySource::Config);
    }

    #[test]
    fn test_registry_from_json_extends_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(
            &path,
            r#"{"algorithms": [{"alias": "west_first", "label": "WEST_FIRST"}]}"#,
        )
        .unwrap();

        let registry = LabelRegistry::from_json_file(&path).unwrap();
        assert_eq!(registry.algorithms.len(), 1);
        assert!(!registry.traffic_patterns.is_empty());

        let identity = IdentityResolver::new(&registry)
            .unwrap()
            .identify(Path::new("WEST_FIRST/rate0.3/TrafficInformation.csv"), None);
        assert_eq!(identity.algorithm, "WEST_FIRST");
    }

    #[test]
    fn test_registry_from_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            LabelRegistry::from_json_file(&path),
            Err(AnalysisError::InvalidRegistry { .. })
        ));
    }
}
