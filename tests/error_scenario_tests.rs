/// エラー処理方針の統合テスト
///
/// 致命的エラーの伝播、利用者向けエラーへの読み替え、
/// ベストエフォート条件の隔離を実行全体を通して検証する。

use jira_extractor::{Error, ExtractorConfig, JiraClient, JiraExtractor};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(datasets: &[&str]) -> ExtractorConfig {
    serde_json::from_value(json!({
        "organization_id": "example",
        "username": "test@example.com",
        "#token": "test_token",
        "since": "2024-01-01",
        "datasets": datasets,
        "max_retries": 0
    }))
    .unwrap()
}

fn extractor_for(server: &MockServer, out: &TempDir, datasets: &[&str]) -> JiraExtractor {
    let client =
        JiraClient::with_base_url(&server.uri(), "test@example.com", "test_token", 0).unwrap();
    JiraExtractor::with_client(test_config(datasets), client, out.path()).unwrap()
}

async fn mount_ok(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_password_auth_403_becomes_user_error() {
    // Given: 認証プローブがパスワード認証拒否の403を返す
    let server = MockServer::start().await;
    mount_ok(&server, "/rest/api/3/field", json!([])).await;
    mount_ok(&server, "/rest/api/3/users", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/project"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "Basic auth with password is not allowed on this instance",
        ))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();

    // When: run
    let result = extractor_for(&server, &out, &[]).run().await;

    // Then: 利用者向けの認証エラーとして失敗する
    match result {
        Err(e @ Error::AuthenticationFailed(_)) => assert!(e.is_user_error()),
        other => panic!("Expected AuthenticationFailed, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_resource_failure_aborts_the_run() {
    // Given: usersだけが失敗する
    let server = MockServer::start().await;
    mount_ok(&server, "/rest/api/3/project", json!([])).await;
    mount_ok(&server, "/rest/api/3/field", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/users"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();

    // When: run
    let result = extractor_for(&server, &out, &[]).run().await;

    // Then: リソース名付きの致命的エラーで実行全体が落ちる
    match result {
        Err(Error::ApiError { resource, status, .. }) => {
            assert_eq!(resource, "users");
            assert_eq!(status, 404);
        }
        other => panic!("Expected ApiError, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_comment_failure_does_not_abort_other_issues() {
    // Given: 2 issueのうち1つだけコメント取得が失敗する
    let server = MockServer::start().await;
    mount_ok(&server, "/rest/api/3/project", json!([])).await;
    mount_ok(&server, "/rest/api/3/field", json!([])).await;
    mount_ok(&server, "/rest/api/3/users", json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0, "maxResults": 100, "total": 2,
            "issues": [
                {"id": "10000", "key": "TEST-1", "fields": {"summary": "a"}},
                {"id": "10001", "key": "TEST-2", "fields": {"summary": "b"}}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/10000/comment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comments": [{
                "id": "500",
                "author": {"accountId": "u1", "displayName": "Alice"},
                "body": {"type": "doc", "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "first"}]}
                ]},
                "created": "2024-02-01T00:00:00.000+0000",
                "updated": "2024-02-01T00:00:00.000+0000"
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/10001/comment"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Issue does not exist"))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();

    // When: issuesとcommentsでrun
    extractor_for(&server, &out, &["issues", "comments"])
        .run()
        .await
        .unwrap();

    // Then: 成功したissueのコメントだけが書かれ、実行は成功する
    let comments = std::fs::read_to_string(out.path().join("comments.csv")).unwrap();
    assert_eq!(comments.lines().count(), 1);
    assert!(comments.contains("\"500\",\"10000\",\"u1\""));
    assert!(comments.contains("\"first\""));
}

#[tokio::test]
async fn test_bulk_changelog_404_falls_back_to_per_issue() {
    // Given: bulkfetchが存在しないAPIリビジョン（404）
    let server = MockServer::start().await;
    mount_ok(&server, "/rest/api/3/project", json!([])).await;
    mount_ok(&server, "/rest/api/3/field", json!([])).await;
    mount_ok(&server, "/rest/api/3/users", json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0, "maxResults": 100, "total": 1,
            "issues": [{
                "id": "10001", "key": "TEST-2", "fields": {"summary": "b"},
                "changelog": {"startAt": 0, "maxResults": 100, "total": 150,
                              "histories": []}
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/changelog/bulkfetch"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    // issueごとのchangelogエンドポイントは2ページ返す
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/TEST-2/changelog"))
        .and(query_param("startAt", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                {"id": "901", "created": "2024-01-11T00:00:00.000+0000",
                 "items": [{"field": "status", "fieldtype": "jira", "from": "1",
                            "fromString": "Open", "to": "2", "toString": "In Progress"}]}
            ],
            "isLast": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/TEST-2/changelog"))
        .and(query_param("startAt", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                {"id": "902", "created": "2024-01-12T00:00:00.000+0000",
                 "items": [{"field": "priority", "fieldtype": "jira", "from": "2",
                            "fromString": "High", "to": "3", "toString": "Medium"}]}
            ],
            "isLast": true
        })))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();

    // When: run
    extractor_for(&server, &out, &["issues", "issues_changelogs"])
        .run()
        .await
        .unwrap();

    // Then: 個別取得の両ページ分が書かれる
    let changelogs =
        std::fs::read_to_string(out.path().join("issues-changelogs.csv")).unwrap();
    assert_eq!(changelogs.lines().count(), 2);
    assert!(changelogs.contains("\"901\",\"10001\",\"TEST-2\""));
    assert!(changelogs.contains("\"902\",\"10001\",\"TEST-2\""));
}

#[tokio::test]
async fn test_changelogs_without_issues_is_a_warning_not_an_error() {
    // Given: issuesを有効にせずchangelogだけを要求する
    let server = MockServer::start().await;
    mount_ok(&server, "/rest/api/3/project", json!([])).await;
    mount_ok(&server, "/rest/api/3/field", json!([])).await;
    mount_ok(&server, "/rest/api/3/users", json!([])).await;

    let out = TempDir::new().unwrap();

    // When: run
    let result = extractor_for(&server, &out, &["issues_changelogs"]).run().await;

    // Then: 警告のみで成功し、issue系のテーブルは作られない
    assert!(result.is_ok());
    assert!(!out.path().join("issues.csv").exists());
    assert!(!out.path().join("issues-changelogs.csv").exists());
}

#[tokio::test]
async fn test_invalid_since_date_fails_before_any_request() {
    // Given: 解釈できないsince
    let config: ExtractorConfig = serde_json::from_value(json!({
        "organization_id": "example",
        "username": "u",
        "#token": "t",
        "since": "the day after tomorrow, maybe",
        "datasets": []
    }))
    .unwrap();

    let out = TempDir::new().unwrap();

    // When: extractorを構築
    let result = JiraExtractor::new(config, out.path());

    // Then: ネットワークに触れる前に設定エラーで失敗する
    match result {
        Err(e @ Error::InvalidSinceDate(_)) => assert!(e.is_user_error()),
        other => panic!("Expected InvalidSinceDate, got {:?}", other.map(|_| ())),
    }
}
