use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::flow::stages::Stage;

/// Configuration file structure for `FlowLens`.
///
/// Holds the GitHub connection defaults, the per-board column to stage
/// mapping and the fetch pacing knobs. Loaded from the current directory or
/// an explicit path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// REST API base URL; GraphQL lives at `{api-url}/graphql`
    #[serde(default = "default_api_url", alias = "base-url")]
    pub api_url: String,

    /// Organization to import
    pub org: Option<String>,

    /// Restrict the import to these repositories
    #[serde(default)]
    pub repos: Vec<String>,

    /// Only import issues updated since this instant
    pub since: Option<DateTime<Utc>>,

    /// Column to stage mapping per board
    #[serde(default, alias = "projects")]
    pub boards: Vec<BoardConfig>,
}

/// Stage mapping for one workflow board.
///
/// Column names are compared trimmed and case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BoardConfig {
    #[serde(deserialize_with = "board_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Drop every issue placed on this board
    #[serde(default)]
    pub exclude: bool,

    /// Only keep issues of these types (empty keeps all)
    #[serde(default)]
    pub types: Vec<String>,

    #[serde(default, alias = "lead_time_columns")]
    pub lead_time_columns: Vec<String>,

    #[serde(default, alias = "cycle_time_columns")]
    pub cycle_time_columns: Vec<String>,

    #[serde(default, alias = "dev_start_columns")]
    pub dev_start_columns: Vec<String>,

    #[serde(default, alias = "review_start_columns")]
    pub review_start_columns: Vec<String>,

    #[serde(default, alias = "qa_start_columns")]
    pub qa_start_columns: Vec<String>,

    #[serde(default, alias = "put_in_ready_columns")]
    pub ready_columns: Vec<String>,

    #[serde(default, alias = "waitingtoprod_start_columns")]
    pub waiting_to_prod_columns: Vec<String>,

    #[serde(default, alias = "inprod_start_columns")]
    pub in_prod_columns: Vec<String>,
}

impl BoardConfig {
    /// Columns that mark entry into `stage`.
    pub fn columns(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::Lead => &self.lead_time_columns,
            Stage::Cycle => &self.cycle_time_columns,
            Stage::Dev => &self.dev_start_columns,
            Stage::Review => &self.review_start_columns,
            Stage::Qa => &self.qa_start_columns,
            Stage::Ready => &self.ready_columns,
            Stage::WaitingToProd => &self.waiting_to_prod_columns,
            Stage::InProd => &self.in_prod_columns,
        }
    }

    /// Whether an issue of `issue_type` passes this board's type filter.
    pub fn allows_type(&self, issue_type: &str) -> bool {
        self.types.is_empty()
            || self
                .types
                .iter()
                .any(|t| t.trim().eq_ignore_ascii_case(issue_type.trim()))
    }
}

/// Board ids are numeric for legacy boards and opaque strings otherwise.
fn board_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Extra wait added after a quota reset
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,

    /// Remaining-quota level below which requests are paced
    #[serde(default = "default_low_water")]
    pub low_water: u32,

    /// Upper bound for a single pacing delay
    #[serde(default = "default_max_pacing_ms")]
    pub max_pacing_ms: u64,

    /// Upper bound for a single quota wait
    #[serde(default = "default_max_quota_wait_secs")]
    pub max_quota_wait_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding every CSV and the import snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pretty-print the JSON snapshot
    #[serde(default)]
    pub pretty: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            org: None,
            repos: Vec::new(),
            since: None,
            boards: Vec::new(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin_secs(),
            low_water: default_low_water(),
            max_pacing_ms: default_max_pacing_ms(),
            max_quota_wait_secs: default_max_quota_wait_secs(),
            page_size: default_page_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pretty: false,
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_safety_margin_secs() -> u64 {
    2
}

fn default_low_water() -> u32 {
    100
}

fn default_max_pacing_ms() -> u64 {
    2000
}

fn default_max_quota_wait_secs() -> u64 {
    3600
}

fn default_page_size() -> u32 {
    100
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./flowlens.toml
    /// 3. ./flowlens.json
    /// 4. ./flowlens.yaml
    /// 5. ./flowlens.yml
    /// 6. ./config.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "flowlens.toml",
            "flowlens.json",
            "flowlens.yaml",
            "flowlens.yml",
            "config.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Finds the stage mapping for a board, by id first and then by name.
    pub fn board(&self, board_id: &str, board_name: &str) -> Option<&BoardConfig> {
        let boards = &self.github.boards;
        boards
            .iter()
            .find(|b| !board_id.is_empty() && b.id == board_id)
            .or_else(|| {
                let name = board_name.trim();
                boards
                    .iter()
                    .find(|b| !name.is_empty() && b.name.trim().eq_ignore_ascii_case(name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.fetch.safety_margin_secs, 2);
        assert_eq!(config.fetch.low_water, 100);
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.output.data_dir, PathBuf::from("data"));
        assert!(config.github.boards.is_empty());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[github]
token = "ghp-test-token"
org = "acme"
repos = ["api", "web"]

[[github.boards]]
id = 42
name = "Delivery"
dev-start-columns = ["In Progress"]
in-prod-columns = ["Released"]

[fetch]
low-water = 50
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.github.token, Some("ghp-test-token".to_string()));
        assert_eq!(config.github.org.as_deref(), Some("acme"));
        assert_eq!(config.github.repos, vec!["api", "web"]);
        assert_eq!(config.github.boards[0].id, "42");
        assert_eq!(config.github.boards[0].columns(Stage::InProd), ["Released"]);
        assert_eq!(config.fetch.low_water, 50);
        assert_eq!(config.fetch.safety_margin_secs, 2);
    }

    #[test]
    fn test_load_yaml_config_with_snake_case_columns() {
        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        let yaml_content = r#"
github:
  org: acme
  projects:
    - id: PVT_kwDOA
      name: Platform
      types: [bug, feature]
      lead_time_columns: [Backlog]
      put_in_ready_columns: [Ready]
      waitingtoprod_start_columns: [Done]
      inprod_start_columns: [Deployed]
    - id: 7
      exclude: true
"#;
        write!(temp_file, "{yaml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        let boards = &config.github.boards;
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].id, "PVT_kwDOA");
        assert_eq!(boards[0].columns(Stage::Lead), ["Backlog"]);
        assert_eq!(boards[0].columns(Stage::Ready), ["Ready"]);
        assert_eq!(boards[0].columns(Stage::WaitingToProd), ["Done"]);
        assert_eq!(boards[0].columns(Stage::InProd), ["Deployed"]);
        assert!(boards[1].exclude);
        assert_eq!(boards[1].id, "7");
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "github": { "api-url": "https://ghe.example.com/api/v3" },
  "output": { "data-dir": "out", "pretty": true }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.output.data_dir, PathBuf::from("out"));
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("does-not-exist.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_board_lookup_by_id_then_name() {
        let mut config = Config::default();
        config.github.boards = vec![
            BoardConfig {
                id: "1".into(),
                name: "Delivery".into(),
                ..BoardConfig::default()
            },
            BoardConfig {
                id: "2".into(),
                name: "Support".into(),
                ..BoardConfig::default()
            },
        ];

        assert_eq!(config.board("2", "whatever").unwrap().name, "Support");
        assert_eq!(config.board("", " delivery ").unwrap().id, "1");
        assert!(config.board("9", "Unknown").is_none());
        assert!(config.board("", "").is_none());
    }

    #[test]
    fn test_type_filter_is_case_insensitive() {
        let board = BoardConfig {
            types: vec!["Bug".into(), "feature".into()],
            ..BoardConfig::default()
        };
        assert!(board.allows_type("bug"));
        assert!(board.allows_type("FEATURE"));
        assert!(!board.allows_type("chore"));
        assert!(BoardConfig::default().allows_type("anything"));
    }
}
