//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! Configuration is loaded once at startup and validated before any grading run starts.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{
    self, DEFAULT_REPORTS_PATH, DEFAULT_SANDBOX_IMAGE, DEFAULT_SANDBOX_MEMORY_LIMIT_MB,
    DEFAULT_SANDBOX_TIMEOUT_SECS, DEFAULT_SUBMISSIONS_PATH, DEFAULT_TEST_SUITES_PATH,
    MAX_SANDBOX_MEMORY_LIMIT_MB,
};
use crate::grading::{ExtractorKind, MalformedPolicy};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub sandbox: SandboxConfig,
    pub grading: GradingConfig,
    pub log: LogConfig,
}

/// On-disk layout of submissions, test suites and reports
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub submissions_path: PathBuf,
    pub test_suites_path: PathBuf,
    pub reports_path: PathBuf,
}

/// Sandbox container configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Explicit Docker socket; falls back to the platform default when unset
    pub docker_socket: Option<String>,
    /// Base image every grading container is created from
    pub image: String,
    /// Test command override; `{report}` is replaced with the per-run report name
    pub test_command: Option<String>,
    /// Extra packages installed before the test command
    pub packages: Vec<String>,
    /// Install pytest and the json-report plugin inside the container
    pub install_test_tools: bool,
    /// Treat a failed package install as fatal
    pub strict_install: bool,
    /// Hard wall-clock limit for the test command
    pub timeout_secs: u64,
    /// Memory limit in megabytes
    pub memory_limit_mb: u64,
}

/// Scoring behaviour
#[derive(Debug, Clone)]
pub struct GradingConfig {
    pub extractor: ExtractorKind,
    pub malformed_policy: MalformedPolicy,
    pub letter_grade: bool,
    /// Reject a second concurrent run for the same `(assignment, submitter)`
    pub reject_duplicates: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub rust_log: String,
    pub format: LogFormat,
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            storage: StorageConfig::from_env()?,
            sandbox: SandboxConfig::from_env()?,
            grading: GradingConfig::from_env()?,
            log: LogConfig::from_env()?,
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject values that would make every grading run fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue("SANDBOX_IMAGE".to_string()));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("SANDBOX_TIMEOUT_SECS".to_string()));
        }
        if self.sandbox.memory_limit_mb == 0
            || self.sandbox.memory_limit_mb > MAX_SANDBOX_MEMORY_LIMIT_MB
        {
            return Err(ConfigError::InvalidValue("SANDBOX_MEMORY_LIMIT_MB".to_string()));
        }
        if let Some(cmd) = &self.sandbox.test_command {
            if cmd.trim().is_empty() {
                return Err(ConfigError::InvalidValue("SANDBOX_TEST_COMMAND".to_string()));
            }
        }
        Ok(())
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            submissions_path: PathBuf::from(
                env::var("SUBMISSIONS_PATH")
                    .unwrap_or_else(|_| DEFAULT_SUBMISSIONS_PATH.to_string()),
            ),
            test_suites_path: PathBuf::from(
                env::var("TEST_SUITES_PATH")
                    .unwrap_or_else(|_| DEFAULT_TEST_SUITES_PATH.to_string()),
            ),
            reports_path: PathBuf::from(
                env::var("REPORTS_PATH").unwrap_or_else(|_| DEFAULT_REPORTS_PATH.to_string()),
            ),
        })
    }

    /// Location of the submission uploaded by `submitter_id` for `assignment_id`
    pub fn submission_path(&self, assignment_id: i64, submitter_id: i64) -> PathBuf {
        self.submissions_path
            .join(constants::submission_file_name(assignment_id, submitter_id))
    }

    /// Location of the fixed test suite for `assignment_id`
    pub fn test_suite_path(&self, assignment_id: i64) -> PathBuf {
        self.test_suites_path
            .join(constants::test_suite_file_name(assignment_id))
    }

    /// Durable location of the retrieved report artifact
    pub fn report_path(&self, assignment_id: i64, submitter_id: i64, extension: &str) -> PathBuf {
        self.reports_path
            .join(constants::report_file_name(assignment_id, submitter_id, extension))
    }
}

impl SandboxConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            docker_socket: env::var("DOCKER_SOCKET").ok().filter(|s| !s.is_empty()),
            image: env::var("SANDBOX_IMAGE").unwrap_or_else(|_| DEFAULT_SANDBOX_IMAGE.to_string()),
            test_command: env::var("SANDBOX_TEST_COMMAND").ok(),
            packages: env::var("SANDBOX_PACKAGES")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            install_test_tools: parse_bool("SANDBOX_INSTALL_TEST_TOOLS", true)?,
            strict_install: parse_bool("SANDBOX_STRICT_INSTALL", false)?,
            timeout_secs: parse_var("SANDBOX_TIMEOUT_SECS", DEFAULT_SANDBOX_TIMEOUT_SECS)?,
            memory_limit_mb: parse_var("SANDBOX_MEMORY_LIMIT_MB", DEFAULT_SANDBOX_MEMORY_LIMIT_MB)?,
        })
    }

    /// Test command for the given extractor, with the configured override taking precedence
    pub fn test_command(&self, extractor: ExtractorKind) -> String {
        self.test_command
            .clone()
            .unwrap_or_else(|| extractor.default_test_command().to_string())
    }

    /// Every package to install before the test command, in install order
    pub fn install_list(&self) -> Vec<String> {
        let mut packages = Vec::new();
        if self.install_test_tools {
            packages.extend(constants::JSON_REPORT_PACKAGES.iter().map(|p| p.to_string()));
        }
        packages.extend(self.packages.iter().cloned());
        packages
    }
}

impl GradingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            extractor: parse_var("GRADING_EXTRACTOR", ExtractorKind::JsonReport)?,
            malformed_policy: parse_var("GRADING_MALFORMED_POLICY", MalformedPolicy::Exclude)?,
            letter_grade: parse_bool("GRADING_LETTER_GRADE", false)?,
            reject_duplicates: parse_bool("GRADING_REJECT_DUPLICATES", false)?,
        })
    }
}

impl LogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "autograder=info".to_string()),
            format: parse_var("LOG_FORMAT", LogFormat::Pretty)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                submissions_path: PathBuf::from(DEFAULT_SUBMISSIONS_PATH),
                test_suites_path: PathBuf::from(DEFAULT_TEST_SUITES_PATH),
                reports_path: PathBuf::from(DEFAULT_REPORTS_PATH),
            },
            sandbox: SandboxConfig {
                docker_socket: None,
                image: DEFAULT_SANDBOX_IMAGE.to_string(),
                test_command: None,
                packages: Vec::new(),
                install_test_tools: true,
                strict_install: false,
                timeout_secs: DEFAULT_SANDBOX_TIMEOUT_SECS,
                memory_limit_mb: DEFAULT_SANDBOX_MEMORY_LIMIT_MB,
            },
            grading: GradingConfig {
                extractor: ExtractorKind::JsonReport,
                malformed_policy: MalformedPolicy::Exclude,
                letter_grade: false,
                reject_duplicates: false,
            },
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            rust_log: "autograder=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = Config::default();
        assert_eq!(
            config.storage.submission_path(1, 42),
            PathBuf::from("./HW/HW_1_42.py")
        );
        assert_eq!(
            config.storage.test_suite_path(1),
            PathBuf::from("./TESTS/test_HW_1.py")
        );
        assert_eq!(
            config.storage.report_path(1, 42, "json"),
            PathBuf::from("./HW/HW_1_42_report.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_follows_extractor() {
        let mut sandbox = Config::default().sandbox;
        assert!(
            sandbox
                .test_command(ExtractorKind::JsonReport)
                .contains("--json-report-file={report}")
        );
        assert_eq!(sandbox.test_command(ExtractorKind::TextLog), "pytest test_HW.py -v");

        sandbox.test_command = Some("python -m pytest -x".to_string());
        assert_eq!(sandbox.test_command(ExtractorKind::TextLog), "python -m pytest -x");
    }

    #[test]
    fn test_install_list_order() {
        let mut sandbox = Config::default().sandbox;
        sandbox.packages = parse_list("numpy, requests");
        assert_eq!(
            sandbox.install_list(),
            vec!["pytest", "pytest-json-report", "numpy", "requests"]
        );

        sandbox.install_test_tools = false;
        assert_eq!(sandbox.install_list(), vec!["numpy", "requests"]);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.sandbox.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key)) if key == "SANDBOX_TIMEOUT_SECS"
        ));
    }

    #[test]
    fn test_validate_bounds_memory_limit() {
        let mut config = Config::default();
        config.sandbox.memory_limit_mb = MAX_SANDBOX_MEMORY_LIMIT_MB;
        assert!(config.validate().is_ok());

        for limit in [0, MAX_SANDBOX_MEMORY_LIMIT_MB + 1, u64::MAX] {
            config.sandbox.memory_limit_mb = limit;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue(key)) if key == "SANDBOX_MEMORY_LIMIT_MB"
            ));
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
