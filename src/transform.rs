use crate::models::{ChangelogPage, History, RawIssue};
use serde_json::{Map, Value};

/// issueを出力行・カスタムフィールドバッグ・埋め込みchangelogに分解した結果
#[derive(Debug, Clone)]
pub struct IssueRecord {
    pub row: Map<String, Value>,
    pub custom_fields: Map<String, Value>,
    pub changelog: Option<ChangelogPage>,
}

/// issueのフィールドバッグを標準カラムとカスタムフィールドに振り分ける
///
/// `customfield_`の命名規約に合うキーはバッグへ、`description`は
/// リッチドキュメントをプレーンテキスト化して置き換え、残りはそのまま
/// 行に通す。`id`と`key`はフィールドバッグの内容に関わらず常に行の
/// トップレベルに入る。
pub fn transform_issue(issue: &RawIssue) -> IssueRecord {
    let mut row = Map::new();
    let mut custom_fields = Map::new();

    row.insert("id".to_string(), Value::String(issue.id.clone()));
    row.insert("key".to_string(), Value::String(issue.key.clone()));

    for (key, value) in &issue.fields {
        if key.contains("customfield_") {
            custom_fields.insert(key.clone(), value.clone());
        } else if key == "description" {
            row.insert(
                "description".to_string(),
                Value::String(plain_text(value)),
            );
        } else {
            row.insert(key.clone(), value.clone());
        }
    }

    IssueRecord {
        row,
        custom_fields,
        changelog: issue.changelog.clone(),
    }
}

/// リッチドキュメントをプレーンテキスト化し、前後の改行を削って
/// NULバイトをリテラルの2文字`\0`に逃がす
fn plain_text(document: &Value) -> String {
    document_text(document)
        .trim_matches('\n')
        .replace('\0', "\\0")
}

/// Atlassianのリッチドキュメントを再帰的にテキストへ落とす
///
/// 未知のノード型は何も出力しない（将来のノード追加をエラーにしない）。
pub fn document_text(value: &Value) -> String {
    let mut text = String::new();

    match value {
        Value::Object(node) if node.contains_key("content") => {
            if let Some(content) = node.get("content") {
                text += &document_text(content);
            }
            if node.get("type").and_then(Value::as_str) == Some("paragraph") {
                text.push('\n');
            }
        }
        Value::Object(node) => match node.get("type").and_then(Value::as_str) {
            Some("inlineCard") | Some("blockCard") => {
                text += attr_text(node, "url");
            }
            Some("text") => {
                text += node.get("text").and_then(Value::as_str).unwrap_or("");
            }
            Some("hardBreak") => text.push('\n'),
            Some("mention") | Some("status") => {
                text += attr_text(node, "text");
            }
            Some("codeBlock") | Some("media") => {}
            _ => {}
        },
        Value::Array(items) => {
            for item in items {
                text += &document_text(item);
            }
        }
        _ => {}
    }

    text
}

fn attr_text<'a>(node: &'a Map<String, Value>, attr: &str) -> &'a str {
    node.get("attrs")
        .and_then(|attrs| attrs.get(attr))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// changelogの履歴エントリ群を出力行に展開する
///
/// 1行 = (履歴エントリ × 変更項目)。項目には1始まりの
/// `changed_item_order`が振られる。埋め込みページと後追い取得の
/// 両方がこの同じ形を通る。
pub fn changelog_rows(
    issue_id: &str,
    issue_key: &str,
    histories: &[History],
) -> Vec<Map<String, Value>> {
    let mut rows = Vec::new();

    for history in histories {
        let author = history.author.clone().unwrap_or_default();

        let mut base = Map::new();
        base.insert(
            "total_changed_items".to_string(),
            Value::from(history.items.len()),
        );
        base.insert("id".to_string(), Value::String(history.id.clone()));
        base.insert("issue_id".to_string(), Value::String(issue_id.to_string()));
        base.insert(
            "issue_key".to_string(),
            Value::String(issue_key.to_string()),
        );
        base.insert(
            "author_accountId".to_string(),
            Value::String(author.account_id.unwrap_or_default()),
        );
        base.insert(
            "author_emailAddress".to_string(),
            Value::String(author.email_address.unwrap_or_default()),
        );
        base.insert(
            "created".to_string(),
            Value::String(history.created.clone()),
        );

        for (idx, item) in history.items.iter().enumerate() {
            let mut row = base.clone();
            for (key, value) in item {
                row.insert(key.clone(), value.clone());
            }
            row.insert("changed_item_order".to_string(), Value::from(idx + 1));
            rows.push(row);
        }
    }

    rows
}

/// 1件のコメントを出力行へ整形する
pub fn comment_row(issue_id: &str, comment: &Value) -> Map<String, Value> {
    let mut row = Map::new();

    row.insert("issue_id".to_string(), Value::String(issue_id.to_string()));
    if let Some(id) = comment.get("id") {
        row.insert("comment_id".to_string(), id.clone());
    }

    copy_author(comment.get("author"), "", &mut row);
    copy_author(comment.get("updateAuthor"), "update_author_", &mut row);

    if let Some(body) = comment.get("body") {
        row.insert("text".to_string(), Value::String(plain_text(body)));
    }
    for key in ["created", "updated"] {
        if let Some(value) = comment.get(key) {
            row.insert(key.to_string(), value.clone());
        }
    }

    row
}

fn copy_author(author: Option<&Value>, prefix: &str, row: &mut Map<String, Value>) {
    let pairs = [
        ("accountId", "account_id"),
        ("emailAddress", "email_address"),
        ("displayName", "display_name"),
        ("active", "active"),
        ("accountType", "account_type"),
    ];

    if let Some(author) = author {
        for (source, target) in pairs {
            if let Some(value) = author.get(source) {
                row.insert(format!("{}{}", prefix, target), value.clone());
            }
        }
    }
}

/// worklogのコメント（リッチドキュメント）をテキスト化して置き換える
pub fn transform_worklog(worklog: &Value) -> Value {
    let mut out = worklog.clone();
    if let Value::Object(map) = &mut out {
        let comment = map.get("comment").cloned().unwrap_or(Value::Null);
        map.insert("comment".to_string(), Value::String(plain_text(&comment)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paragraph_with_hard_break() {
        let document = json!({
            "type": "paragraph",
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "hardBreak"},
                {"type": "text", "text": "world"}
            ]
        });

        assert_eq!(document_text(&document), "hello\nworld\n");
    }

    #[test]
    fn test_unknown_node_type_is_silent() {
        assert_eq!(document_text(&json!({"type": "futureWidget"})), "");
    }

    #[test]
    fn test_full_document_walk() {
        let document = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "See "},
                    {"type": "inlineCard", "attrs": {"url": "https://example.com"}},
                    {"type": "mention", "attrs": {"id": "u1", "text": "@alice"}}
                ]},
                {"type": "codeBlock", "attrs": {"language": "rust"}},
                {"type": "paragraph", "content": [
                    {"type": "status", "attrs": {"text": "DONE", "color": "green"}}
                ]}
            ]
        });

        assert_eq!(
            document_text(&document),
            "See https://example.com@alice\nDONE\n"
        );
    }

    #[test]
    fn test_scalars_and_null_contribute_nothing() {
        assert_eq!(document_text(&json!(null)), "");
        assert_eq!(document_text(&json!("legacy plain text")), "");
        assert_eq!(document_text(&json!(42)), "");
    }

    #[test]
    fn test_custom_field_separation() {
        let issue: RawIssue = serde_json::from_value(json!({
            "id": "10000",
            "key": "TEST-1",
            "fields": {
                "customfield_1001": "x",
                "summary": "y"
            }
        }))
        .unwrap();

        let record = transform_issue(&issue);

        assert_eq!(record.row.get("summary"), Some(&json!("y")));
        assert!(!record.row.contains_key("customfield_1001"));
        assert_eq!(record.custom_fields.get("customfield_1001"), Some(&json!("x")));
        // idとkeyは常にトップレベル
        assert_eq!(record.row.get("id"), Some(&json!("10000")));
        assert_eq!(record.row.get("key"), Some(&json!("TEST-1")));
    }

    #[test]
    fn test_description_replaced_with_plain_text() {
        let issue: RawIssue = serde_json::from_value(json!({
            "id": "1",
            "key": "TEST-1",
            "fields": {
                "description": {
                    "type": "doc",
                    "content": [{"type": "paragraph", "content": [
                        {"type": "text", "text": "body\u{0000}text"}
                    ]}]
                }
            }
        }))
        .unwrap();

        let record = transform_issue(&issue);

        // 末尾改行は削られ、NULは2文字にエスケープされる
        assert_eq!(record.row.get("description"), Some(&json!("body\\0text")));
    }

    #[test]
    fn test_null_description_becomes_empty() {
        let issue: RawIssue = serde_json::from_value(json!({
            "id": "1",
            "key": "TEST-1",
            "fields": {"description": null}
        }))
        .unwrap();

        let record = transform_issue(&issue);

        assert_eq!(record.row.get("description"), Some(&json!("")));
    }

    #[test]
    fn test_changelog_rows_shape_and_order() {
        let histories: Vec<History> = serde_json::from_value(json!([
            {
                "id": "100",
                "author": {"accountId": "u1", "emailAddress": "u1@example.com"},
                "created": "2024-01-15T10:30:00.000+0000",
                "items": [
                    {"field": "status", "fieldtype": "jira", "from": "1",
                     "fromString": "Open", "to": "3", "toString": "In Progress"},
                    {"field": "assignee", "fieldtype": "jira", "from": null,
                     "fromString": null, "to": "u2", "toString": "Bob"}
                ]
            },
            {
                "id": "101",
                "created": "2024-01-16T09:00:00.000+0000",
                "items": [
                    {"field": "priority", "fieldtype": "jira", "from": "2",
                     "fromString": "High", "to": "3", "toString": "Medium"}
                ]
            }
        ]))
        .unwrap();

        let rows = changelog_rows("10000", "TEST-1", &histories);

        // (履歴 × 変更項目) で3行
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("changed_item_order"), Some(&json!(1)));
        assert_eq!(rows[1].get("changed_item_order"), Some(&json!(2)));
        assert_eq!(rows[2].get("changed_item_order"), Some(&json!(1)));
        assert_eq!(rows[0].get("total_changed_items"), Some(&json!(2)));
        assert_eq!(rows[2].get("total_changed_items"), Some(&json!(1)));
        assert_eq!(rows[0].get("issue_key"), Some(&json!("TEST-1")));
        assert_eq!(rows[1].get("field"), Some(&json!("assignee")));
        // 変更者が欠けた履歴は空文字になる
        assert_eq!(rows[2].get("author_accountId"), Some(&json!("")));
        assert_eq!(rows[2].get("author_emailAddress"), Some(&json!("")));
    }

    #[test]
    fn test_comment_row() {
        let comment = json!({
            "id": "200",
            "author": {
                "accountId": "u1",
                "displayName": "Alice",
                "emailAddress": "alice@example.com",
                "active": true,
                "accountType": "atlassian"
            },
            "updateAuthor": {"accountId": "u2", "displayName": "Bob"},
            "body": {"type": "doc", "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "LGTM"}]}
            ]},
            "created": "2024-02-01T00:00:00.000+0000",
            "updated": "2024-02-02T00:00:00.000+0000"
        });

        let row = comment_row("10000", &comment);

        assert_eq!(row.get("comment_id"), Some(&json!("200")));
        assert_eq!(row.get("issue_id"), Some(&json!("10000")));
        assert_eq!(row.get("account_id"), Some(&json!("u1")));
        assert_eq!(row.get("text"), Some(&json!("LGTM")));
        assert_eq!(row.get("update_author_account_id"), Some(&json!("u2")));
        assert!(!row.contains_key("update_author_email_address"));
    }

    #[test]
    fn test_transform_worklog_comment() {
        let worklog = json!({
            "id": "300",
            "issueId": "10000",
            "comment": {"type": "doc", "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "worked"}]}
            ]},
            "timeSpentSeconds": 3600
        });

        let out = transform_worklog(&worklog);

        assert_eq!(out.get("comment"), Some(&json!("worked")));
        assert_eq!(out.get("timeSpentSeconds"), Some(&json!(3600)));
    }
}
