//! 审计日志 API 集成测试

use axum::http::{header, StatusCode};
use serde_json::json;

mod common;
use common::{spawn_app, TestApp};

/// 产生若干条审计日志：初始管理员 + 登录 + 两个职位
async fn seed(app: &TestApp) -> String {
    let token = app.admin_token().await;
    app.create_position(&token, "GOVERNOR", "county").await;
    app.create_position(&token, "SENATOR", "county").await;
    token
}

#[tokio::test]
async fn test_list_audit_logs_newest_first() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app.get("/api/audit?page=1&limit=2", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["pagination"]["total"], 4);
    assert_eq!(json["logs"].as_array().unwrap().len(), 2);
    assert_eq!(json["logs"][0]["action"], "CREATE_POSITION");
    assert_eq!(json["logs"][0]["previousHash"], json["logs"][1]["hash"]);
}

#[tokio::test]
async fn test_list_filters_by_entity_type() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app.get("/api/audit?entityType=Position", &token).await;
    assert_eq!(response.json()["pagination"]["total"], 2);

    let response = app.get("/api/audit?entityType=Nope", &token).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_and_verify_entry() {
    let app = spawn_app().await;
    let token = seed(&app).await;
    let list = app.get("/api/audit", &token).await;
    let id = list.json()["logs"][0]["id"].as_str().unwrap().to_string();

    let response = app.get(&format!("/api/audit/{}", id), &token).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["id"], id.as_str());

    let response = app.get(&format!("/api/audit/{}/verify", id), &token).await;
    assert_eq!(response.status, StatusCode::OK);
    let verification = response.json();
    assert_eq!(verification["valid"], true);
    assert_eq!(verification["hash"], verification["computedHash"]);

    let missing = uuid::Uuid::new_v4();
    let response = app.get(&format!("/api/audit/{}", missing), &token).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_chain_on_intact_log() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app.get("/api/audit/verify-chain", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    let report = response.json();
    assert_eq!(report["valid"], true);
    assert_eq!(report["total"], 4);
    assert!(report["tampered"].as_array().unwrap().is_empty());
    assert!(report["brokenLinks"].as_array().unwrap().is_empty());
    assert!(report["forks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_export_csv_matches_json() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let json_export = app.get("/api/audit/export?format=json", &token).await;
    assert_eq!(json_export.status, StatusCode::OK);
    let count = json_export.json()["count"].as_u64().unwrap();
    assert_eq!(count, 4);

    let csv_export = app.get("/api/audit/export?format=csv", &token).await;
    assert_eq!(csv_export.status, StatusCode::OK);
    assert!(csv_export.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(csv_export.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment;"));

    let text = csv_export.text();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("Timestamp,Action,Entity Type"));
    assert_eq!(lines.count() as u64, count);
}

#[tokio::test]
async fn test_export_is_not_audited() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    app.get("/api/audit/export", &token).await;
    app.get("/api/audit/export?format=csv", &token).await;
    app.get("/api/audit/verify-chain", &token).await;

    let response = app.get("/api/audit", &token).await;
    assert_eq!(response.json()["pagination"]["total"], 4);
}

#[tokio::test]
async fn test_export_unknown_format() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app.get("/api/audit/export?format=xml", &token).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_counts() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app.get("/api/audit/summary", &token).await;

    assert_eq!(response.status, StatusCode::OK);
    let summary = response.json();
    assert_eq!(summary["total"], 4);
    assert_eq!(summary["byAction"]["CREATE_POSITION"], 2);
    assert_eq!(summary["byAction"]["USER_LOGIN"], 1);
    assert_eq!(summary["byAction"]["USER_REGISTER"], 1);
    assert_eq!(summary["tamperedCount"], 0);
}

#[tokio::test]
async fn test_trail_rejects_unknown_entity_type() {
    let app = spawn_app().await;
    let token = seed(&app).await;

    let response = app
        .get(
            &format!("/api/audit/trail/spaceship/{}", uuid::Uuid::new_v4()),
            &token,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_observer_can_read_but_not_export_or_verify() {
    let app = spawn_app().await;
    let observer = app
        .user_token("watcher", "observer", json!({ "level": "national" }))
        .await;

    assert_eq!(app.get("/api/audit", &observer).await.status, StatusCode::OK);
    assert_eq!(
        app.get("/api/audit/export", &observer).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.get("/api/audit/verify-chain", &observer).await.status,
        StatusCode::FORBIDDEN
    );
}
