use crate::error::Result;
use serde_json::{Map, Value};

/// issue系リソースでカスタムフィールドバッグを運ぶ予約キー
pub const CUSTOM_FIELDS_KEY: &str = "custom_fields";

/// 出力テーブル1つ分のスキーマ定義
///
/// `fields`はAPI側のキー表記、`renamed`は出力カラム名。両者は同じ長さで
/// 位置対応する。`json_encoded`の値はJSONテキストとして直列化される。
#[derive(Debug)]
pub struct TableSchema {
    pub fields: &'static [&'static str],
    pub renamed: &'static [&'static str],
    pub json_encoded: &'static [&'static str],
    pub primary_key: &'static [&'static str],
}

impl TableSchema {
    /// フラット化済みの行をスキーマに射影する
    ///
    /// `json_encoded`のキーはJSONテキスト化、`fields`にあるキーはそのまま、
    /// それ以外は黙って捨てる（上流APIの項目追加に耐えるための方針）。
    /// カスタムフィールドバッグは最後に挿入され、同名キーを上書きする。
    pub fn project(
        &self,
        flat_row: &Map<String, Value>,
        custom_fields: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();

        for (key, value) in flat_row {
            if self.json_encoded.contains(&key.as_str()) {
                out.insert(key.clone(), Value::String(serde_json::to_string(value)?));
            } else if self.fields.contains(&key.as_str()) {
                out.insert(key.clone(), value.clone());
            }
        }

        if let Some(custom) = custom_fields {
            out.insert(
                CUSTOM_FIELDS_KEY.to_string(),
                Value::String(serde_json::to_string(custom)?),
            );
        }

        Ok(out)
    }
}

/// 出力テーブルの列挙
///
/// テーブル名の文字列からの動的解決はせず、ここで静的に引く。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Projects,
    Users,
    Fields,
    Issues,
    IssuesChangelogs,
    Worklogs,
    WorklogsDeleted,
    Boards,
    Sprints,
    SprintsIssues,
    Organizations,
    Servicedesks,
    ServicedeskCustomers,
    Comments,
}

impl Table {
    pub const ALL: [Table; 14] = [
        Table::Projects,
        Table::Users,
        Table::Fields,
        Table::Issues,
        Table::IssuesChangelogs,
        Table::Worklogs,
        Table::WorklogsDeleted,
        Table::Boards,
        Table::Sprints,
        Table::SprintsIssues,
        Table::Organizations,
        Table::Servicedesks,
        Table::ServicedeskCustomers,
        Table::Comments,
    ];

    /// 出力ファイルのベース名
    pub fn name(&self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::Users => "users",
            Table::Fields => "fields",
            Table::Issues => "issues",
            Table::IssuesChangelogs => "issues-changelogs",
            Table::Worklogs => "worklogs",
            Table::WorklogsDeleted => "worklogs-deleted",
            Table::Boards => "boards",
            Table::Sprints => "sprints",
            Table::SprintsIssues => "sprints-issues",
            Table::Organizations => "organizations",
            Table::Servicedesks => "servicedesks",
            Table::ServicedeskCustomers => "servicedesk-customers",
            Table::Comments => "comments",
        }
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Projects => &PROJECTS,
            Table::Users => &USERS,
            Table::Fields => &FIELDS,
            Table::Issues => &ISSUES,
            Table::IssuesChangelogs => &ISSUES_CHANGELOGS,
            Table::Worklogs => &WORKLOGS,
            Table::WorklogsDeleted => &WORKLOGS_DELETED,
            Table::Boards => &BOARDS,
            Table::Sprints => &SPRINTS,
            Table::SprintsIssues => &SPRINTS_ISSUES,
            Table::Organizations => &ORGANIZATIONS,
            Table::Servicedesks => &SERVICEDESKS,
            Table::ServicedeskCustomers => &SERVICEDESK_CUSTOMERS,
            Table::Comments => &COMMENTS,
        }
    }
}

static ISSUES: TableSchema = TableSchema {
    fields: &[
        "id",
        "key",
        "statuscategorychangedate",
        "issuetype_id",
        "issuetype_name",
        "timespent",
        "project_key",
        "fixVersions",
        "aggregatetimespent",
        "resolution",
        "resolutiondate",
        "resolution_id",
        "resolution_name",
        "resolution_description",
        "workratio",
        "lastViewed",
        "created",
        "priority_id",
        "priority_name",
        "labels",
        "timeestimate",
        "aggregatetimeoriginalestimate",
        "assignee_accountId",
        "assignee_displayName",
        "updated",
        "status_id",
        "status_name",
        "components",
        "timeoriginalestimate",
        "security",
        "aggregatetimeestimate",
        "summary",
        "description",
        "creator_accountId",
        "creator_emailAddress",
        "creator_displayName",
        "parent_id",
        "subtasks",
        "reporter_accountId",
        "reporter_displayName",
        "aggregateprogress_progress",
        "aggregateprogress_total",
        "environment",
        "duedate",
        "progress_progress",
        "progress_total",
        "custom_fields",
        "issuelinks",
    ],
    renamed: &[
        "id",
        "key",
        "status_category_change_date",
        "issue_type_id",
        "issue_type_name",
        "time_spent",
        "project_key",
        "fix_versions",
        "aggregate_time_spent",
        "resolution",
        "resolution_date",
        "resolution_id",
        "resolution_name",
        "resolution_description",
        "work_ratio",
        "last_viewed",
        "created",
        "priority_id",
        "priority_name",
        "labels",
        "time_estimate",
        "aggregate_time_original_estimate",
        "assignee_account_id",
        "assignee_display_name",
        "updated",
        "status_id",
        "status_name",
        "components",
        "time_original_estimate",
        "security",
        "aggregate_time_estimate",
        "summary",
        "description",
        "creator_account_id",
        "creator_email_address",
        "creator_display_name",
        "parent_id",
        "subtasks",
        "reporter_account_id",
        "reporter_display_name",
        "aggregate_progress",
        "aggregate_progress_total",
        "environment",
        "due_date",
        "progress",
        "progress_total",
        "custom_fields",
        "issuelinks",
    ],
    json_encoded: &[
        "fixVersions",
        "components",
        "subtasks",
        "custom_fields",
        "issuelinks",
    ],
    primary_key: &["id"],
};

static USERS: TableSchema = TableSchema {
    fields: &[
        "accountId",
        "displayName",
        "active",
        "accountType",
        "emailAddress",
        "locale",
    ],
    renamed: &[
        "account_id",
        "display_name",
        "active",
        "account_type",
        "email_address",
        "locale",
    ],
    json_encoded: &[],
    primary_key: &["account_id"],
};

static FIELDS: TableSchema = TableSchema {
    fields: &["id", "key", "name", "custom"],
    renamed: &["id", "key", "name", "custom"],
    json_encoded: &[],
    primary_key: &["id", "key"],
};

static PROJECTS: TableSchema = TableSchema {
    fields: &[
        "id",
        "key",
        "name",
        "description",
        "projectCategory_id",
        "projectCategory_name",
        "projectCategory_description",
        "projectTypeKey",
        "isPrivate",
        "archived",
        "archivedBy_accountId",
        "archivedBy_displayName",
    ],
    renamed: &[
        "id",
        "key",
        "name",
        "description",
        "project_category_id",
        "project_category_name",
        "project_category_description",
        "project_type_key",
        "is_private",
        "archived",
        "archived_by_account_id",
        "archived_by_display_name",
    ],
    json_encoded: &[],
    primary_key: &["id", "key"],
};

static WORKLOGS_DELETED: TableSchema = TableSchema {
    fields: &["worklogId", "updatedTime"],
    renamed: &["worklog_id", "updated_time"],
    json_encoded: &[],
    primary_key: &["worklog_id"],
};

static WORKLOGS: TableSchema = TableSchema {
    fields: &[
        "id",
        "issueId",
        "author_accountId",
        "author_displayName",
        "updateAuthor_accountId",
        "updateAuthor_displayName",
        "created",
        "updated",
        "started",
        "timeSpent",
        "timeSpentSeconds",
        "comment",
    ],
    renamed: &[
        "id",
        "issue_id",
        "author_account_id",
        "author_display_name",
        "update_author_account_id",
        "update_author_display_name",
        "created",
        "updated",
        "started",
        "time_spent",
        "time_spent_seconds",
        "comment",
    ],
    json_encoded: &[],
    primary_key: &["id"],
};

static ISSUES_CHANGELOGS: TableSchema = TableSchema {
    fields: &[
        "id",
        "issue_id",
        "issue_key",
        "author_accountId",
        "author_emailAddress",
        "created",
        "total_changed_items",
        "changed_item_order",
        "field",
        "fieldtype",
        "from",
        "fromString",
        "to",
        "toString",
    ],
    renamed: &[
        "id",
        "issue_id",
        "issue_key",
        "author_account_id",
        "author_email_address",
        "created",
        "total_changed_items",
        "changed_item_order",
        "field",
        "field_type",
        "from",
        "from_string",
        "to",
        "to_string",
    ],
    json_encoded: &[],
    primary_key: &["id", "issue_key", "field"],
};

static BOARDS: TableSchema = TableSchema {
    fields: &["id", "self", "name", "type", "location_projectId"],
    renamed: &["id", "url", "name", "type", "project_id"],
    json_encoded: &[],
    primary_key: &["id"],
};

static SPRINTS: TableSchema = TableSchema {
    fields: &[
        "id",
        "board_id",
        "self",
        "state",
        "name",
        "startDate",
        "endDate",
        "completeDate",
        "originBoardId",
        "goal",
    ],
    renamed: &[
        "id",
        "board_id",
        "url",
        "state",
        "name",
        "start_date",
        "end_date",
        "complete_date",
        "origin_board_id",
        "goal",
    ],
    json_encoded: &[],
    primary_key: &["id"],
};

static SPRINTS_ISSUES: TableSchema = TableSchema {
    fields: &["id", "sprint_id", "key"],
    renamed: &["issue_id", "sprint_id", "issue_key"],
    json_encoded: &[],
    primary_key: &["issue_id", "sprint_id"],
};

static ORGANIZATIONS: TableSchema = TableSchema {
    fields: &["id", "name"],
    renamed: &["id", "name"],
    json_encoded: &[],
    primary_key: &["id"],
};

static SERVICEDESKS: TableSchema = TableSchema {
    fields: &["id", "projectId", "projectName", "projectKey"],
    renamed: &["id", "project_id", "project_name", "project_key"],
    json_encoded: &[],
    primary_key: &["id"],
};

static SERVICEDESK_CUSTOMERS: TableSchema = TableSchema {
    fields: &[
        "accountId",
        "organization_id",
        "displayName",
        "emailAddress",
        "active",
        "timeZone",
    ],
    renamed: &[
        "account_id",
        "organization_id",
        "display_name",
        "email_address",
        "active",
        "time_zone",
    ],
    json_encoded: &[],
    primary_key: &["account_id", "organization_id"],
};

static COMMENTS: TableSchema = TableSchema {
    fields: &[
        "comment_id",
        "issue_id",
        "account_id",
        "email_address",
        "display_name",
        "active",
        "account_type",
        "text",
        "update_author_account_id",
        "update_author_display_name",
        "update_author_active",
        "update_author_email_address",
        "update_author_account_type",
        "created",
        "updated",
    ],
    renamed: &[
        "comment_id",
        "issue_id",
        "account_id",
        "email_address",
        "display_name",
        "active",
        "account_type",
        "text",
        "update_author_account_id",
        "update_author_display_name",
        "update_author_active",
        "update_author_email_address",
        "update_author_account_type",
        "created",
        "updated",
    ],
    json_encoded: &[],
    primary_key: &["comment_id"],
};
