use crate::client::{JiraClient, MAX_RESULTS};
use crate::config::{Dataset, ExtractorConfig};
use crate::error::{Error, Result};
use crate::schema::Table;
use crate::since::{SinceDate, parse_since};
use crate::transform::{changelog_rows, comment_row, transform_issue, transform_worklog};
use crate::writer::TableWriter;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// changelogが切り詰められていたissueへの参照
///
/// issueページングの間に積まれ、後段の一括取得でちょうど1回消費される。
#[derive(Debug, Clone)]
struct PendingChangelog {
    issue_id: String,
    issue_key: String,
}

/// 抽出ジョブ本体
///
/// 有効化されたデータセットを依存順に取得し、リソースごとの
/// ライターへ流し込む。独立したリソース同士はI/O待ちの間だけ
/// 交互に進む（単一スレッドの協調実行）。
pub struct JiraExtractor {
    config: ExtractorConfig,
    client: JiraClient,
    since: SinceDate,
    out_dir: PathBuf,
}

impl JiraExtractor {
    pub fn new(config: ExtractorConfig, out_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let since = parse_since(&config.since)?;
        let client = JiraClient::new(&config)?;

        Ok(Self {
            config,
            client,
            since,
            out_dir: out_dir.into(),
        })
    }

    /// クライアントを差し替えて作る（テスト用モックサーバー向け）
    pub fn with_client(
        config: ExtractorConfig,
        client: JiraClient,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let since = parse_since(&config.since)?;

        Ok(Self {
            config,
            client,
            since,
            out_dir: out_dir.into(),
        })
    }

    pub async fn run(&self) -> Result<()> {
        if self.config.has_dataset(Dataset::IssuesChangelogs)
            && !self.config.has_dataset(Dataset::Issues)
        {
            warn!("Issues need to be enabled in order to download issues changelogs.");
        }

        // 独立リソースは並行に取得する。依存の連鎖（boards→sprints→
        // sprint-issues、organizations→customers）は各タスクの中で順に進む。
        tokio::try_join!(
            self.download_projects(),
            self.download_fields(),
            self.download_users(),
            self.download_worklogs(),
            self.download_boards_and_sprints(),
            self.download_servicedesk(),
        )?;

        let issue_ids = if self.config.has_dataset(Dataset::Issues) {
            self.download_issues().await?
        } else {
            Vec::new()
        };

        if self.config.has_dataset(Dataset::Comments) {
            if self.config.has_dataset(Dataset::Issues) {
                self.download_comments(&issue_ids).await?;
            } else {
                warn!("Issues need to be enabled in order to download comments.");
            }
        }

        for custom in &self.config.custom_jql {
            info!("Downloading custom JQL : {}", custom.jql);
            self.download_custom_jql(&custom.jql, &custom.table_name)
                .await?;
        }

        Ok(())
    }

    async fn download_projects(&self) -> Result<()> {
        info!("Downloading projects.");
        let projects = self.client.get_projects().await?;

        let mut writer = TableWriter::create(&self.out_dir, Table::Projects, self.config.incremental)?;
        writer.write_values(&projects)?;
        writer.close()
    }

    async fn download_fields(&self) -> Result<()> {
        info!("Downloading a list of fields.");
        let fields = self.client.get_fields().await?;

        let mut writer = TableWriter::create(&self.out_dir, Table::Fields, self.config.incremental)?;
        writer.write_values(&fields)?;
        writer.close()
    }

    async fn download_users(&self) -> Result<()> {
        info!("Downloading users.");
        let users = self.client.get_users().await?;

        let mut writer = TableWriter::create(&self.out_dir, Table::Users, self.config.incremental)?;
        writer.write_values(&users)?;
        writer.close()
    }

    async fn download_worklogs(&self) -> Result<()> {
        if !self.config.has_dataset(Dataset::Worklogs) {
            return Ok(());
        }

        info!("Downloading worklogs.");
        let updated = self.client.get_updated_worklogs(self.since.epoch_ms).await?;
        let worklog_ids: Vec<Value> = updated
            .iter()
            .filter_map(|w| w.get("worklogId").cloned())
            .collect();
        let worklogs = self.client.get_worklogs(&worklog_ids).await?;

        let mut writer = TableWriter::create(&self.out_dir, Table::Worklogs, self.config.incremental)?;
        let transformed: Vec<Value> = worklogs.iter().map(transform_worklog).collect();
        writer.write_values(&transformed)?;
        writer.close()?;

        let deleted = self.client.get_deleted_worklogs(self.since.epoch_ms).await?;
        let mut writer =
            TableWriter::create(&self.out_dir, Table::WorklogsDeleted, self.config.incremental)?;
        writer.write_values(&deleted)?;
        writer.close()
    }

    async fn download_boards_and_sprints(&self) -> Result<()> {
        if !self.config.has_dataset(Dataset::BoardsAndSprints) {
            return Ok(());
        }

        info!("Downloading boards and sprints.");
        let boards = self.client.get_boards().await?;
        let board_ids: Vec<i64> = boards.iter().filter_map(|b| b["id"].as_i64()).collect();

        let mut writer = TableWriter::create(&self.out_dir, Table::Boards, self.config.incremental)?;
        writer.write_values(&boards)?;
        writer.close()?;

        let since_date = self.since.jql_date();
        let mut sprint_writer =
            TableWriter::create(&self.out_dir, Table::Sprints, self.config.incremental)?;
        // 同じsprintが複数のboardに現れるため、issue取得はid集合で1回に潰す
        let mut sprint_ids = HashSet::new();

        for board_id in board_ids {
            let sprints = self.client.get_board_sprints(board_id).await?;

            for sprint in &sprints {
                if sprint_finished_since(sprint, &since_date) {
                    if let Some(id) = sprint["id"].as_i64() {
                        sprint_ids.insert(id);
                    }
                }

                let mut row = sprint.clone();
                if let Value::Object(map) = &mut row {
                    map.insert("board_id".to_string(), json!(board_id));
                }
                sprint_writer.write_values(&[row])?;
            }
        }
        sprint_writer.close()?;

        let mut sprint_ids: Vec<i64> = sprint_ids.into_iter().collect();
        sprint_ids.sort_unstable();

        let mut issues_writer =
            TableWriter::create(&self.out_dir, Table::SprintsIssues, self.config.incremental)?;
        for sprint_id in sprint_ids {
            let issues = self
                .client
                .get_sprint_issues(sprint_id, Some(&since_date))
                .await?;

            for issue in &issues {
                let mut row = issue.clone();
                if let Value::Object(map) = &mut row {
                    map.insert("sprint_id".to_string(), json!(sprint_id));
                }
                issues_writer.write_values(&[row])?;
            }
        }
        issues_writer.close()
    }

    async fn download_servicedesk(&self) -> Result<()> {
        if !self.config.has_dataset(Dataset::Servicedesk) {
            return Ok(());
        }

        info!("Downloading service desk organizations.");
        let organizations = self.client.get_organizations().await?;
        let organization_ids: Vec<i64> = organizations
            .iter()
            .filter_map(|o| o["id"].as_i64().or_else(|| o["id"].as_str()?.parse().ok()))
            .collect();

        let mut writer =
            TableWriter::create(&self.out_dir, Table::Organizations, self.config.incremental)?;
        writer.write_values(&organizations)?;
        writer.close()?;

        let mut customers_writer = TableWriter::create(
            &self.out_dir,
            Table::ServicedeskCustomers,
            self.config.incremental,
        )?;
        for organization_id in organization_ids {
            let customers = self
                .client
                .get_organization_customers(organization_id)
                .await?;

            for customer in &customers {
                let mut row = customer.clone();
                if let Value::Object(map) = &mut row {
                    map.insert("organization_id".to_string(), json!(organization_id));
                }
                customers_writer.write_values(&[row])?;
            }
        }
        customers_writer.close()?;

        info!("Downloading service desks.");
        let servicedesks = self.client.get_servicedesks().await?;
        let mut writer =
            TableWriter::create(&self.out_dir, Table::Servicedesks, self.config.incremental)?;
        writer.write_values(&servicedesks)?;
        writer.close()
    }

    /// issue本体の取得
    ///
    /// ページごとに変換と書き込みを進めつつ、changelogが有効なら
    /// 埋め込みページが完結しているissueは即時に行を吐き、切り詰められた
    /// issueは保留リストへ積んで全ページ消費後にまとめて取得する。
    /// 1つのissueが両方の経路を通ることはない。
    async fn download_issues(&self) -> Result<Vec<String>> {
        info!("Downloading issues.");
        let jql = issues_jql(&self.config, &self.since);
        let changelogs_enabled = self.config.has_dataset(Dataset::IssuesChangelogs);

        let mut issues_writer =
            TableWriter::create(&self.out_dir, Table::Issues, self.config.incremental)?;
        let mut changelog_writer = if changelogs_enabled {
            Some(TableWriter::create(
                &self.out_dir,
                Table::IssuesChangelogs,
                self.config.incremental,
            )?)
        } else {
            None
        };

        let mut issue_ids = Vec::new();
        let mut pending: Vec<PendingChangelog> = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.client.search_issues(Some(&jql), offset).await?;
            let count = page.issues.len();

            for issue in &page.issues {
                issue_ids.push(issue.id.clone());
                let record = transform_issue(issue);
                issues_writer.write_row(&record.row, Some(&record.custom_fields))?;

                if let Some(writer) = changelog_writer.as_mut() {
                    match &record.changelog {
                        Some(changelog) if !changelog.is_complete() => {
                            pending.push(PendingChangelog {
                                issue_id: issue.id.clone(),
                                issue_key: issue.key.clone(),
                            });
                        }
                        Some(changelog) => {
                            for row in changelog_rows(&issue.id, &issue.key, &changelog.histories)
                            {
                                writer.write_row(&row, None)?;
                            }
                        }
                        None => {}
                    }
                }
            }

            if count < MAX_RESULTS as usize {
                break;
            }
            offset += MAX_RESULTS;
        }

        if let Some(writer) = changelog_writer.as_mut() {
            self.download_pending_changelogs(writer, &pending).await?;
        }

        issues_writer.close()?;
        if let Some(writer) = changelog_writer {
            writer.close()?;
        }

        Ok(issue_ids)
    }

    /// 保留になったissueのchangelogをまとめて取得する（第2フェーズ）
    ///
    /// 一括エンドポイントが使えないAPIリビジョン（404）では
    /// issueごとの取得に切り替える。
    async fn download_pending_changelogs(
        &self,
        writer: &mut TableWriter,
        pending: &[PendingChangelog],
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        info!(
            "Downloading full changelogs for {} issues with truncated history.",
            pending.len()
        );

        let keys: Vec<String> = pending.iter().map(|p| p.issue_key.clone()).collect();
        let key_by_id: HashMap<&str, &str> = pending
            .iter()
            .map(|p| (p.issue_id.as_str(), p.issue_key.as_str()))
            .collect();

        match self.client.get_changelogs_bulk(&keys).await {
            Ok(changelogs) => {
                for issue_changelogs in changelogs {
                    let issue_key = key_by_id
                        .get(issue_changelogs.issue_id.as_str())
                        .copied()
                        .unwrap_or_default();
                    for row in changelog_rows(
                        &issue_changelogs.issue_id,
                        issue_key,
                        &issue_changelogs.histories,
                    ) {
                        writer.write_row(&row, None)?;
                    }
                }
            }
            Err(Error::ApiError { status: 404, .. }) => {
                for reference in pending {
                    let histories = self.client.get_changelogs(&reference.issue_key).await?;
                    for row in
                        changelog_rows(&reference.issue_id, &reference.issue_key, &histories)
                    {
                        writer.write_row(&row, None)?;
                    }
                }
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// issueごとのコメント取得（ベストエフォート）
    ///
    /// 1 issueの失敗はログに残して空扱いにし、実行は続ける。
    async fn download_comments(&self, issue_ids: &[String]) -> Result<()> {
        info!("Downloading comments for {} issues.", issue_ids.len());
        let mut writer =
            TableWriter::create(&self.out_dir, Table::Comments, self.config.incremental)?;

        for issue_id in issue_ids {
            match self.client.get_comments(issue_id).await {
                Ok(comments) => {
                    for comment in &comments {
                        writer.write_row(&comment_row(issue_id, comment), None)?;
                    }
                }
                Err(e) => {
                    error!("Could not download comments for issue {}.", issue_id);
                    error!("Received: {}.", e);
                }
            }
        }

        writer.close()
    }

    async fn download_custom_jql(&self, jql: &str, table_name: &str) -> Result<()> {
        let mut writer = TableWriter::create_as(
            &self.out_dir,
            Table::Issues,
            self.config.incremental,
            table_name,
        )?;

        let mut offset = 0;
        loop {
            let page = self.client.search_custom_jql(jql, offset).await?;
            let count = page.issues.len();

            for issue in &page.issues {
                let record = transform_issue(issue);
                writer.write_row(&record.row, Some(&record.custom_fields))?;
            }

            if count < MAX_RESULTS as usize {
                break;
            }
            offset += MAX_RESULTS;
        }

        writer.close()
    }
}

/// issue検索のJQL（生JQLの上書きが更新日フィルターより優先）
fn issues_jql(config: &ExtractorConfig, since: &SinceDate) -> String {
    match &config.jql_override {
        Some(jql) => jql.clone(),
        None => format!("updated >= {}", since.jql_date()),
    }
}

/// sprintのissueを取るかどうかの判定
///
/// 完了日が基準日以降のsprintだけが対象。完了日のないsprint
/// （アクティブなもの）は常に対象になる。ISO形式同士の文字列比較。
fn sprint_finished_since(sprint: &Value, since_date: &str) -> bool {
    sprint
        .get("completeDate")
        .and_then(Value::as_str)
        .unwrap_or(since_date)
        >= since_date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(jql_override: Option<String>) -> ExtractorConfig {
        serde_json::from_value(serde_json::json!({
            "organization_id": "example",
            "username": "u",
            "#token": "t",
            "since": "2024-01-01",
            "datasets": ["issues"],
            "jql_override": jql_override
        }))
        .unwrap()
    }

    #[test]
    fn test_default_jql_uses_since_date() {
        let config = config_with(None);
        let since = crate::since::parse_since("2024-01-01").unwrap();

        assert_eq!(issues_jql(&config, &since), "updated >= 2024-01-01");
    }

    #[test]
    fn test_jql_override_takes_precedence() {
        let config = config_with(Some("project = TEST".to_string()));
        let since = crate::since::parse_since("2024-01-01").unwrap();

        assert_eq!(issues_jql(&config, &since), "project = TEST");
    }

    #[test]
    fn test_sprint_completed_before_since_is_skipped() {
        let sprint = serde_json::json!({"id": 1, "completeDate": "2023-12-01T10:00:00.000Z"});

        assert!(!sprint_finished_since(&sprint, "2024-01-01"));
    }

    #[test]
    fn test_sprint_completed_after_since_is_taken() {
        let sprint = serde_json::json!({"id": 1, "completeDate": "2024-02-01T10:00:00.000Z"});

        assert!(sprint_finished_since(&sprint, "2024-01-01"));
    }

    #[test]
    fn test_active_sprint_without_complete_date_is_taken() {
        let sprint = serde_json::json!({"id": 1, "state": "active"});

        assert!(sprint_finished_since(&sprint, "2024-01-01"));
    }
}
