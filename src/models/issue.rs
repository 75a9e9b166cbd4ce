use super::ChangelogPage;
use serde::Deserialize;
use serde_json::{Map, Value};

/// 検索APIの1ページ
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub issues: Vec<RawIssue>,
}

/// APIが返す生のissue
///
/// フィールドバッグはAPIバージョンによって形が保証されないため
/// 型付けせずに持ち回る。
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub changelog: Option<ChangelogPage>,
}
