//! Configuration parsing and management for testgap.
//!
//! This crate provides:
//! - Configuration types (`Config`, `Profile`, etc.)
//! - TOML parsing
//! - Profile system (oss, team, strict)
//! - Precedence handling (CLI > config file > defaults)
//! - Source path filters (include/exclude, test sources, file pattern)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for by [`discover_config_from`].
pub const CONFIG_FILE_NAME: &str = "testgap.toml";

/// Default pattern selecting source files.
pub const DEFAULT_SOURCE_PATTERN: &str = "**/*.java";

/// Default patterns identifying test sources.
pub const DEFAULT_TEST_PATTERNS: &[&str] = &[
    "**/src/test/**",
    "**/*Test.java",
    "**/*Tests.java",
    "**/*IT.java",
];

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Built-in configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Open-source friendly: report gaps without blocking.
    Oss,
    /// Team standard: error on uncovered methods, warn on unresolved ones.
    #[default]
    Team,
    /// Strict: error on uncovered and unresolved methods, accessors included.
    Strict,
}

/// Determines when the evaluation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailOn {
    /// Fail if there are any error-level findings.
    #[default]
    Error,
    /// Fail if there are any warn-level or error-level findings.
    Warn,
    /// Never fail (always pass unless there's a runtime error).
    Never,
}

/// How to handle methods whose coverage cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedBehavior {
    /// Don't report them.
    Skip,
    /// Warn about them but don't fail.
    #[default]
    Warn,
    /// Fail if any method is unresolved or ambiguous.
    Fail,
}

/// Path filtering configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathConfig {
    /// Glob patterns for files/directories to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Glob patterns for files/directories to include (allowlist).
    /// If empty, all files are included.
    #[serde(default)]
    pub include: Vec<String>,
    /// Repo-relative directory the comparison is restricted to.
    #[serde(default)]
    pub sub_directory: Option<String>,
    /// Glob selecting source files.
    #[serde(default)]
    pub source_pattern: Option<String>,
    /// Globs identifying test sources, which are never analyzed.
    #[serde(default)]
    pub test_patterns: Option<Vec<String>>,
}

/// Full configuration for testgap.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Configuration profile to use.
    #[serde(default)]
    pub profile: Option<Profile>,

    /// Determines when the evaluation should fail.
    #[serde(default)]
    pub fail_on: Option<FailOn>,

    /// Maximum tolerated share of uncovered methods, in percent (0-100).
    #[serde(default)]
    pub max_test_gap_pct: Option<f64>,

    /// Number of uncovered methods tolerated before they become errors.
    #[serde(default)]
    pub max_uncovered_methods: Option<u32>,

    /// How to handle unresolved and ambiguous methods.
    #[serde(default)]
    pub unresolved: Option<UnresolvedBehavior>,

    /// Keep getters and setters in the analysis.
    #[serde(default)]
    pub include_accessors: Option<bool>,

    /// Path filtering configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Profile defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub fail_on: FailOn,
    pub max_test_gap_pct: f64,
    pub max_uncovered_methods: Option<u32>,
    pub unresolved: UnresolvedBehavior,
    pub include_accessors: bool,
    pub exclude_patterns: Vec<String>,
    pub include_patterns: Vec<String>,
    pub sub_directory: Option<String>,
    pub source_pattern: String,
    pub test_patterns: Vec<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        profile_defaults(Profile::Team)
    }
}

impl EffectiveConfig {
    /// Whether a changed file takes part in the analysis.
    ///
    /// The path must match the source pattern and the include/exclude
    /// filters, and must not be a test source.
    pub fn accepts_path(&self, path: &str) -> bool {
        matches_any_pattern(path, std::slice::from_ref(&self.source_pattern))
            && !matches_any_pattern(path, &self.test_patterns)
            && should_include_path(path, &self.include_patterns, &self.exclude_patterns)
    }
}

// ============================================================================
// Profile Defaults
// ============================================================================

/// Get default configuration for a profile.
pub fn profile_defaults(profile: Profile) -> EffectiveConfig {
    let base = EffectiveConfig {
        fail_on: FailOn::Error,
        max_test_gap_pct: 100.0,
        max_uncovered_methods: None,
        unresolved: UnresolvedBehavior::Warn,
        include_accessors: false,
        exclude_patterns: vec![],
        include_patterns: vec![],
        sub_directory: None,
        source_pattern: DEFAULT_SOURCE_PATTERN.to_string(),
        test_patterns: DEFAULT_TEST_PATTERNS.iter().map(|p| p.to_string()).collect(),
    };

    match profile {
        Profile::Oss => EffectiveConfig {
            fail_on: FailOn::Never,
            unresolved: UnresolvedBehavior::Skip,
            ..base
        },
        Profile::Team => base,
        Profile::Strict => EffectiveConfig {
            unresolved: UnresolvedBehavior::Fail,
            include_accessors: true,
            ..base
        },
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(pct) = config.max_test_gap_pct
        && !(0.0..=100.0).contains(&pct)
    {
        return Err(ConfigError::InvalidValue(format!(
            "max_test_gap_pct must be between 0 and 100, got {}",
            pct
        )));
    }

    let paths = &config.paths;
    let patterns = paths
        .include
        .iter()
        .chain(&paths.exclude)
        .chain(&paths.source_pattern)
        .chain(paths.test_patterns.iter().flatten());
    for pattern in patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::InvalidValue(format!(
                "invalid glob pattern `{}`: {}",
                pattern, e
            )));
        }
    }

    if let Some(dir) = &paths.sub_directory
        && (Path::new(dir).is_absolute() || dir.split(['/', '\\']).any(|c| c == ".."))
    {
        return Err(ConfigError::InvalidValue(format!(
            "sub_directory must be a relative path inside the repository, got {}",
            dir
        )));
    }
    Ok(())
}

/// Find and load `testgap.toml`, searching `start` and its parent directories.
pub fn discover_config_from(start: &Path) -> Option<(PathBuf, Config)> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists()
            && let Ok(config) = load_config(&config_path)
        {
            return Some((config_path, config));
        }

        if !current.pop() {
            break;
        }
    }

    None
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub profile: Option<Profile>,
    pub fail_on: Option<FailOn>,
    pub max_test_gap_pct: Option<f64>,
    pub max_uncovered_methods: Option<u32>,
    pub unresolved: Option<UnresolvedBehavior>,
    pub include_accessors: Option<bool>,
    pub sub_directory: Option<String>,
}

/// Resolve effective configuration from profile, config file, and CLI overrides.
///
/// Precedence: CLI > config file > profile defaults > global defaults
pub fn resolve_config(
    config: Option<&Config>,
    cli: &CliOverrides,
) -> Result<EffectiveConfig, ConfigError> {
    let profile = cli
        .profile
        .or_else(|| config.and_then(|c| c.profile))
        .unwrap_or_default();
    let mut effective = profile_defaults(profile);

    if let Some(config) = config {
        if let Some(fail_on) = config.fail_on {
            effective.fail_on = fail_on;
        }
        if let Some(pct) = config.max_test_gap_pct {
            effective.max_test_gap_pct = pct;
        }
        if let Some(max) = config.max_uncovered_methods {
            effective.max_uncovered_methods = Some(max);
        }
        if let Some(behavior) = config.unresolved {
            effective.unresolved = behavior;
        }
        if let Some(include) = config.include_accessors {
            effective.include_accessors = include;
        }
        effective.exclude_patterns = config.paths.exclude.clone();
        effective.include_patterns = config.paths.include.clone();
        if let Some(dir) = &config.paths.sub_directory {
            effective.sub_directory = Some(dir.clone());
        }
        if let Some(pattern) = &config.paths.source_pattern {
            effective.source_pattern = pattern.clone();
        }
        if let Some(patterns) = &config.paths.test_patterns {
            effective.test_patterns = patterns.clone();
        }
    }

    if let Some(fail_on) = cli.fail_on {
        effective.fail_on = fail_on;
    }
    if let Some(pct) = cli.max_test_gap_pct {
        if !(0.0..=100.0).contains(&pct) {
            return Err(ConfigError::InvalidValue(format!(
                "threshold must be between 0 and 100, got {}",
                pct
            )));
        }
        effective.max_test_gap_pct = pct;
    }
    if let Some(max) = cli.max_uncovered_methods {
        effective.max_uncovered_methods = Some(max);
    }
    if let Some(behavior) = cli.unresolved {
        effective.unresolved = behavior;
    }
    if let Some(include) = cli.include_accessors {
        effective.include_accessors = include;
    }
    if let Some(dir) = &cli.sub_directory {
        effective.sub_directory = Some(dir.clone());
    }

    Ok(effective)
}

// ============================================================================
// Path Filtering
// ============================================================================

/// Check if a path matches any of the given glob patterns.
pub fn matches_any_pattern(path: &str, patterns: &[String]) -> bool {
    for pattern in patterns {
        if let Ok(glob_pattern) = glob::Pattern::new(pattern)
            && glob_pattern.matches(path)
        {
            return true;
        }
    }
    false
}

/// Filter a path based on include/exclude patterns.
///
/// Returns `true` if the path should be included in evaluation.
pub fn should_include_path(
    path: &str,
    include_patterns: &[String],
    exclude_patterns: &[String],
) -> bool {
    if matches_any_pattern(path, exclude_patterns) {
        return false;
    }

    if !include_patterns.is_empty() && !matches_any_pattern(path, include_patterns) {
        return false;
    }

    true
}

// ============================================================================
// Tests
// ============================================================================
