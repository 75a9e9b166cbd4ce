use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::models::{
    BulkChangelogPage, History, IssueChangelogs, OffsetPage, SearchPage, TokenPage,
};
use crate::pagination::{collect_cursor_pages, collect_offset_pages, collect_token_pages};
use base64::Engine;
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// コアAPIの1ページ上限
pub const MAX_RESULTS: u32 = 100;
/// アジャイル（board/sprint）APIの1ページ上限
pub const MAX_RESULTS_AGILE: u32 = 50;
/// サービスデスクAPIの1ページ上限
pub const MAX_RESULTS_SERVICEDESK: u32 = 50;
/// 一括エンドポイント（worklog/list、changelog/bulkfetch）のチャンクサイズ
const BULK_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct JiraClient {
    client: Client,
    base_url: String,
    agile_url: String,
    servicedesk_url: String,
    max_retries: u32,
}

impl JiraClient {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let base = format!("https://{}.atlassian.net", config.organization_id);
        Self::with_base_url(&base, &config.username, &config.api_token, config.max_retries)
    }

    /// ベースURLを差し替えてクライアントを作る（テスト用モックサーバー向け）
    pub fn with_base_url(
        base: &str,
        username: &str,
        api_token: &str,
        max_retries: u32,
    ) -> Result<Self> {
        let _ = Url::parse(base)
            .map_err(|_| Error::InvalidConfiguration("Invalid base URL".to_string()))?;
        let base = base.trim_end_matches('/');

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = format!("{}:{}", username, api_token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(auth_value.as_bytes());
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Basic {}", encoded))
                .map_err(|_| Error::InvalidConfiguration("Invalid auth header".to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/api/3/", base),
            agile_url: format!("{}/rest/agile/1.0/", base),
            servicedesk_url: format!("{}/rest/servicedeskapi/", base),
            max_retries,
        })
    }

    /// リトライ付きでリクエストを実行し、2xxのJSONボディを型へ落とす
    ///
    /// トランスポートエラー、429、5xxは上限までリトライする。それ以外の
    /// 非2xxは即座にリソース名付きのエラーになる。
    async fn execute<T>(
        &self,
        resource: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;

        loop {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }

                    let message = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(Error::ApiError {
                        resource: resource.to_string(),
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::RequestFailed(e));
                }
            }
        }
    }

    async fn get<T>(&self, resource: &str, url: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.execute(resource, || self.client.get(url).query(query))
            .await
    }

    async fn post<T>(&self, resource: &str, url: &str, body: &Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.execute(resource, || self.client.post(url).json(body))
            .await
    }

    /// プロジェクト一覧（認証プローブを兼ねる）
    ///
    /// パスワード認証拒否の403は、APIトークンを疑う利用者向けの
    /// 認証エラーへ読み替える。
    pub async fn get_projects(&self) -> Result<Vec<Value>> {
        let url = format!("{}project", self.base_url);
        let result = self
            .get("projects", &url, &[("expand", "description".to_string())])
            .await;

        match result {
            Err(Error::ApiError {
                status: 403,
                message,
                ..
            }) if message.contains("Basic auth with password is not allowed on this instance") => {
                Err(Error::AuthenticationFailed(
                    "Please, check the API token.".to_string(),
                ))
            }
            other => other,
        }
    }

    pub async fn get_users(&self) -> Result<Vec<Value>> {
        let url = format!("{}users", self.base_url);

        collect_offset_pages(MAX_RESULTS, |offset| {
            let url = url.clone();
            async move {
                let users: Vec<Value> = self
                    .get(
                        "users",
                        &url,
                        &[
                            ("startAt", offset.to_string()),
                            ("maxResults", MAX_RESULTS.to_string()),
                        ],
                    )
                    .await?;
                Ok(OffsetPage::from(users))
            }
        })
        .await
    }

    pub async fn get_fields(&self) -> Result<Vec<Value>> {
        let url = format!("{}field", self.base_url);
        self.get(
            "fields",
            &url,
            &[("expand", "projects.issuetypes.fields".to_string())],
        )
        .await
    }

    /// issue検索の1ページ（changelog展開付き）
    pub async fn search_issues(&self, jql: Option<&str>, offset: u32) -> Result<SearchPage> {
        self.search_page("issues", jql, offset).await
    }

    /// カスタムJQLの1ページ（エラーメッセージのリソース名だけが異なる）
    pub async fn search_custom_jql(&self, jql: &str, offset: u32) -> Result<SearchPage> {
        self.search_page("custom JQL", Some(jql), offset).await
    }

    async fn search_page(
        &self,
        resource: &str,
        jql: Option<&str>,
        offset: u32,
    ) -> Result<SearchPage> {
        let url = format!("{}search", self.base_url);
        let mut query = vec![
            ("startAt", offset.to_string()),
            ("maxResults", MAX_RESULTS.to_string()),
            ("expand", "changelog".to_string()),
        ];
        if let Some(jql) = jql {
            query.push(("jql", jql.to_string()));
        }

        self.get(resource, &url, &query).await
    }

    /// 1 issueの全changelog（埋め込みページが不完全だった場合の個別追撃）
    pub async fn get_changelogs(&self, issue_key: &str) -> Result<Vec<History>> {
        let url = format!("{}issue/{}/changelog", self.base_url, issue_key);
        let resource = format!("changelogs for issue {}", issue_key);

        collect_offset_pages(MAX_RESULTS, |offset| {
            let url = url.clone();
            let resource = resource.clone();
            async move {
                self.get::<OffsetPage<History>>(
                    &resource,
                    &url,
                    &[
                        ("startAt", offset.to_string()),
                        ("maxResults", MAX_RESULTS.to_string()),
                    ],
                )
                .await
            }
        })
        .await
    }

    /// 複数issueのchangelogを一括取得する（1000キーずつ、トークンページング）
    pub async fn get_changelogs_bulk(&self, issue_keys: &[String]) -> Result<Vec<IssueChangelogs>> {
        let url = format!("{}changelog/bulkfetch", self.base_url);
        let mut all = Vec::new();

        for chunk in issue_keys.chunks(BULK_CHUNK_SIZE) {
            let mut items = collect_token_pages(|token| {
                let url = url.clone();
                let mut body = serde_json::json!({
                    "issueIdsOrKeys": chunk,
                    "maxResults": MAX_RESULTS,
                });
                if let Some(token) = token {
                    body["nextPageToken"] = token.into();
                }
                async move {
                    let page: BulkChangelogPage =
                        self.post("issues changelogs", &url, &body).await?;
                    Ok(TokenPage {
                        values: page.issue_changelogs,
                        next_page_token: page.next_page_token,
                        is_last: page.is_last,
                    })
                }
            })
            .await?;
            all.append(&mut items);
        }

        Ok(all)
    }

    /// `since`以降に更新されたworklogの参照一覧（カーソルページング）
    pub async fn get_updated_worklogs(&self, since: i64) -> Result<Vec<Value>> {
        self.worklog_cursor("updated worklogs", "worklog/updated", since)
            .await
    }

    /// `since`以降に削除されたworklogの一覧（カーソルページング）
    pub async fn get_deleted_worklogs(&self, since: i64) -> Result<Vec<Value>> {
        self.worklog_cursor("deleted worklogs", "worklog/deleted", since)
            .await
    }

    async fn worklog_cursor(
        &self,
        resource: &str,
        endpoint: &str,
        since: i64,
    ) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.base_url, endpoint);

        collect_cursor_pages(since, |cursor| {
            let url = url.clone();
            let resource = resource.to_string();
            async move {
                self.get(&resource, &url, &[("since", cursor.to_string())])
                    .await
            }
        })
        .await
    }

    /// worklog本体の一括取得（IDを1000件ずつPOST）
    pub async fn get_worklogs(&self, worklog_ids: &[Value]) -> Result<Vec<Value>> {
        let url = format!("{}worklog/list", self.base_url);
        let mut all = Vec::new();

        for chunk in worklog_ids.chunks(BULK_CHUNK_SIZE) {
            let body = serde_json::json!({ "ids": chunk });
            let mut worklogs: Vec<Value> =
                self.post("changed worklogs", &url, &body).await?;
            all.append(&mut worklogs);
        }

        Ok(all)
    }

    /// 1 issueのコメント一覧（単一ページ）
    ///
    /// 失敗の扱いは呼び出し側の方針（ベストエフォート）に委ねる。
    pub async fn get_comments(&self, issue_id: &str) -> Result<Vec<Value>> {
        #[derive(Deserialize)]
        struct CommentsResponse {
            #[serde(default)]
            comments: Vec<Value>,
        }

        let url = format!("{}issue/{}/comment", self.base_url, issue_id);
        let resource = format!("comments for issue {}", issue_id);
        let response: CommentsResponse = self.get(&resource, &url, &[]).await?;
        Ok(response.comments)
    }

    pub async fn get_boards(&self) -> Result<Vec<Value>> {
        let url = format!("{}board", self.agile_url);

        collect_offset_pages(MAX_RESULTS_AGILE, |offset| {
            let url = url.clone();
            async move {
                self.get::<OffsetPage<Value>>(
                    "boards",
                    &url,
                    &[
                        ("startAt", offset.to_string()),
                        ("maxResults", MAX_RESULTS_AGILE.to_string()),
                    ],
                )
                .await
            }
        })
        .await
    }

    /// boardのsprint一覧
    ///
    /// sprint非対応のboardが返す400（英語とチェコ語の2種の文言）は
    /// エラーではなく空の結果として扱う。
    pub async fn get_board_sprints(&self, board_id: i64) -> Result<Vec<Value>> {
        let url = format!("{}board/{}/sprint", self.agile_url, board_id);
        let resource = format!("sprints for board {}", board_id);

        let result = collect_offset_pages(MAX_RESULTS_AGILE, |offset| {
            let url = url.clone();
            let resource = resource.clone();
            async move {
                self.get::<OffsetPage<Value>>(
                    &resource,
                    &url,
                    &[
                        ("startAt", offset.to_string()),
                        ("maxResults", MAX_RESULTS_AGILE.to_string()),
                    ],
                )
                .await
            }
        })
        .await;

        match result {
            Err(Error::ApiError {
                status: 400,
                message,
                ..
            }) if sprints_not_supported(&message) => Ok(Vec::new()),
            other => other,
        }
    }

    /// sprintに属するissueの参照（id/keyのみ）
    pub async fn get_sprint_issues(
        &self,
        sprint_id: i64,
        update_date: Option<&str>,
    ) -> Result<Vec<Value>> {
        #[derive(Deserialize)]
        struct SprintIssuesPage {
            #[serde(default)]
            issues: Vec<Value>,
        }

        let url = format!("{}sprint/{}/issue", self.agile_url, sprint_id);
        let resource = format!("issues for sprint {}", sprint_id);
        let jql = update_date.map(|date| format!("updated >= {}", date));

        collect_offset_pages(MAX_RESULTS, |offset| {
            let url = url.clone();
            let resource = resource.clone();
            let jql = jql.clone();
            async move {
                let mut query = vec![
                    ("startAt", offset.to_string()),
                    ("maxResults", MAX_RESULTS.to_string()),
                    ("fields", "id,key".to_string()),
                ];
                if let Some(jql) = jql {
                    query.push(("jql", jql));
                }
                let page: SprintIssuesPage = self.get(&resource, &url, &query).await?;
                Ok(OffsetPage::from(page.issues))
            }
        })
        .await
    }

    pub async fn get_organizations(&self) -> Result<Vec<Value>> {
        let url = format!("{}organization", self.servicedesk_url);
        self.servicedesk_pages("organizations", url).await
    }

    pub async fn get_organization_customers(&self, organization_id: i64) -> Result<Vec<Value>> {
        let url = format!("{}organization/{}/user", self.servicedesk_url, organization_id);
        let resource = format!("customers for organization {}", organization_id);
        self.servicedesk_pages(&resource, url).await
    }

    pub async fn get_servicedesks(&self) -> Result<Vec<Value>> {
        let url = format!("{}servicedesk", self.servicedesk_url);
        self.servicedesk_pages("service desks", url).await
    }

    // サービスデスクAPIはstart/limitパラメータとisLastPageフラグを使う
    async fn servicedesk_pages(&self, resource: &str, url: String) -> Result<Vec<Value>> {
        collect_offset_pages(MAX_RESULTS_SERVICEDESK, |offset| {
            let url = url.clone();
            let resource = resource.to_string();
            async move {
                self.get::<OffsetPage<Value>>(
                    &resource,
                    &url,
                    &[
                        ("start", offset.to_string()),
                        ("limit", MAX_RESULTS_SERVICEDESK.to_string()),
                    ],
                )
                .await
            }
        })
        .await
    }
}

fn sprints_not_supported(message: &str) -> bool {
    message.contains("The board does not support sprints")
        || message.contains("Tabule nepodporuje sprinty")
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * (1 << attempt.min(5)))
}
