use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// 検索結果に埋め込まれるchangelogページ
///
/// `max_results < total` の場合、埋め込みページは不完全で
/// 後続の一括取得に回される。
#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogPage {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub histories: Vec<History>,
}

impl ChangelogPage {
    /// 埋め込みページだけで全履歴が揃っているか
    pub fn is_complete(&self) -> bool {
        self.max_results >= self.total
    }
}

/// 1回の変更操作（複数フィールドの変更を束ねる）
#[derive(Debug, Clone, Deserialize)]
pub struct History {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub author: Option<ChangeAuthor>,
    #[serde(deserialize_with = "string_or_number")]
    pub created: String,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
}

/// 変更者（検索APIとbulkfetch APIで欠けうる）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeAuthor {
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<String>,
}

/// `changelog/bulkfetch` の1ページ
#[derive(Debug, Clone, Deserialize)]
pub struct BulkChangelogPage {
    #[serde(rename = "issueChangeLogs", default)]
    pub issue_changelogs: Vec<IssueChangelogs>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
    #[serde(rename = "isLast", default)]
    pub is_last: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueChangelogs {
    #[serde(rename = "issueId", deserialize_with = "string_or_number")]
    pub issue_id: String,
    #[serde(rename = "changeHistories", default)]
    pub histories: Vec<History>,
}

// APIのリビジョンにより文字列と数値の両方が現れるフィールド用
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
