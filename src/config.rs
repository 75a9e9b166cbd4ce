use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// 抽出対象のデータセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Dataset {
    #[serde(rename = "issues")]
    Issues,
    #[serde(rename = "issues_changelogs")]
    IssuesChangelogs,
    #[serde(rename = "boards_n_sprints")]
    BoardsAndSprints,
    #[serde(rename = "worklogs")]
    Worklogs,
    #[serde(rename = "comments")]
    Comments,
    #[serde(rename = "servicedesk")]
    Servicedesk,
}

/// カスタムJQL定義（1定義につき1出力テーブル）
#[derive(Debug, Clone, Deserialize)]
pub struct CustomJql {
    #[serde(default)]
    pub jql: String,
    #[serde(default)]
    pub table_name: String,
}

/// 抽出ジョブの設定
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub organization_id: String,
    pub username: String,
    #[serde(rename = "#token", alias = "token")]
    pub api_token: String,
    pub since: String,
    #[serde(default = "default_incremental", deserialize_with = "bool_from_int")]
    pub incremental: bool,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub custom_jql: Vec<CustomJql>,
    /// issuesのデフォルトの更新日フィルターを置き換える生JQL
    #[serde(default)]
    pub jql_override: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_incremental() -> bool {
    true
}

fn default_max_retries() -> u32 {
    5
}

// 設定ファイルの歴史的経緯により 0/1 とtrue/falseの両方を受け付ける
fn bool_from_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        _ => Err(serde::de::Error::custom("expected bool or integer")),
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    parameters: ExtractorConfig,
}

impl ExtractorConfig {
    /// 設定ファイル（`config.json`）から読み込み
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfiguration(format!("Invalid config file: {}", e)))?;

        let config = file.parameters;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        use std::env;

        let organization_id = env::var("JIRA_ORGANIZATION").map_err(|_| {
            Error::ConfigurationMissing("JIRA_ORGANIZATION not found in environment".to_string())
        })?;

        let username = env::var("JIRA_USER").map_err(|_| {
            Error::ConfigurationMissing("JIRA_USER not found in environment".to_string())
        })?;

        let api_token = env::var("JIRA_API_TOKEN").map_err(|_| {
            Error::ConfigurationMissing("JIRA_API_TOKEN not found in environment".to_string())
        })?;

        let since = env::var("JIRA_SINCE").unwrap_or_else(|_| "1 week ago".to_string());

        let config = Self {
            organization_id,
            username,
            api_token,
            since,
            incremental: true,
            datasets: vec![Dataset::Issues],
            custom_jql: Vec::new(),
            jql_override: None,
            max_retries: default_max_retries(),
        };

        config.validate()?;
        Ok(config)
    }

    /// 必須パラメータとカスタムJQL定義の検証
    pub fn validate(&self) -> Result<()> {
        if self.organization_id.is_empty() {
            return Err(Error::ConfigurationMissing(
                "organization_id must be filled in".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(Error::ConfigurationMissing(
                "username must be filled in".to_string(),
            ));
        }
        if self.api_token.is_empty() {
            return Err(Error::ConfigurationMissing(
                "#token must be filled in".to_string(),
            ));
        }
        if self.since.is_empty() {
            return Err(Error::ConfigurationMissing(
                "since must be filled in".to_string(),
            ));
        }

        for custom in &self.custom_jql {
            if custom.jql.is_empty() {
                return Err(Error::InvalidConfiguration(
                    "Custom JQL error: JQL is empty, must be filled in".to_string(),
                ));
            }
            if custom.table_name.is_empty() {
                return Err(Error::InvalidConfiguration(
                    "Custom JQL error: table name is empty, must be filled in".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn has_dataset(&self, dataset: Dataset) -> bool {
        self.datasets.contains(&dataset)
    }
}
