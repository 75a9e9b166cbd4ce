use serde::Deserialize;

/// オフセットページネーションの封筒レスポンス
///
/// 配列ルートのエンドポイントは`From<Vec<T>>`で包む（`is_last`なし、
/// 件数からの完了判定になる）。
#[derive(Debug, Clone, Deserialize)]
pub struct OffsetPage<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(rename = "isLast", alias = "isLastPage", default)]
    pub is_last: Option<bool>,
}

impl<T> From<Vec<T>> for OffsetPage<T> {
    fn from(values: Vec<T>) -> Self {
        Self {
            values,
            is_last: None,
        }
    }
}

/// カーソル（since/until）ページネーションのレスポンス
#[derive(Debug, Clone, Deserialize)]
pub struct CursorPage<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(rename = "lastPage")]
    pub last_page: bool,
    #[serde(default)]
    pub until: Option<i64>,
}

/// 不透明トークンページネーションのレスポンス
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPage<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
    #[serde(rename = "isLast", default)]
    pub is_last: Option<bool>,
}
