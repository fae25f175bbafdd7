//! Integration tests for spreadsheet sync
//!
//! Tests cover:
//! - Row classification (inserted, duplicate, invalid) for each dataset
//! - Matching against existing members and rows inserted earlier in the run
//! - Header validation and blank-row handling
//! - Pulling rows from the configured spreadsheet source
//! - Failed rows and database errors part way through a run
//! - Issue resolution: overwrite, force-create and dismiss
//! - Sync permissions per dataset

mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::{json, Value};

fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

fn rows_body(rows: &[&[&str]]) -> Value {
    json!({ "rows": sheet(rows) })
}

fn issue_at(summary: &Value, row_number: i64) -> Value {
    summary["issues"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["row_number"] == row_number)
        .cloned()
        .unwrap_or_else(|| panic!("no issue for row {} in {}", row_number, summary))
}

// =============================================================================
// Members
// =============================================================================

#[tokio::test]
async fn test_member_sync_classifies_rows() {
    let t = TestApp::new().await;
    let ama = t.member("Ama", "Mensah", None).await;

    let (status, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[
                &["Name", "Phone", "Email", "Department", "Date Joined"],
                &["Kofi Boateng", "024 222 2222", "kofi@example.com", "", "01/02/2024"],
                &["Ama Mensah", "", "", "", ""],
                &["Esi", "0243333333", "", "", ""],
                &["", "", "", "", ""],
                &["Kofi Boateng", "+233 24 222 2222", "", "", ""],
                &["Yaw Darko", "0244444444", "", "Choir", ""],
                &["Abena Owusu", "0245555555", "not-an-email", "", ""],
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["dataset"], "members");
    assert_eq!(summary["source"], "upload");
    assert_eq!(summary["total_rows"], 6, "blank rows are not counted");
    assert_eq!(summary["inserted"], 1);
    assert_eq!(summary["duplicates"], 2);
    assert_eq!(summary["invalid"], 3);
    assert_eq!(summary["failed"], 0);

    let existing = issue_at(&summary, 3);
    assert_eq!(existing["kind"], "duplicate");
    assert_eq!(existing["existing_id"], ama.as_str());

    let same_run = issue_at(&summary, 6);
    assert_eq!(same_run["kind"], "duplicate", "matches the row inserted earlier in the run");

    assert_eq!(issue_at(&summary, 4)["kind"], "invalid");
    assert!(issue_at(&summary, 7)["reason"].as_str().unwrap().contains("unknown department"));
    assert!(issue_at(&summary, 8)["reason"].as_str().unwrap().contains("email"));
    assert_eq!(issue_at(&summary, 8)["payload"]["Email"], "not-an-email");

    let (_, page) = t.admin("GET", "/api/members?q=boateng", None).await;
    assert_eq!(page["total"], 1);
    let kofi = &page["items"][0];
    assert_eq!(kofi["phone"], "233242222222");
    assert_eq!(kofi["joined_on"], "2024-02-01", "dates are read day-first");
}

#[tokio::test]
async fn test_member_sync_fuzzy_and_ambiguous_names() {
    let t = TestApp::new().await;
    let kwame = t.member("Kwame", "Asante", None).await;
    t.member("John", "Mensah", None).await;
    t.member("John", "Mensah", None).await;

    let (status, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[
                &["First Name", "Surname", "Mobile"],
                &["kwame", "asanteh", ""],
                &["Kwame", "Asante", "0209999999"],
                &["John", "Mensah", ""],
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", summary);

    let near = issue_at(&summary, 2);
    assert_eq!(near["kind"], "duplicate");
    assert_eq!(near["existing_id"], kwame.as_str());

    // Same name but only the row has a phone: a different person
    assert_eq!(summary["inserted"], 1);

    let ambiguous = issue_at(&summary, 4);
    assert_eq!(ambiguous["kind"], "invalid");
    assert!(ambiguous["reason"].as_str().unwrap().contains("ambiguous"));
}

#[tokio::test]
async fn test_missing_required_column_rejects_sheet() {
    let t = TestApp::new().await;

    let (status, body) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[&["Phone", "Email"], &["0241111111", ""]])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("name"));

    let (status, _) = t
        .admin("POST", "/api/sync/members/rows", Some(json!({ "rows": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, runs) = t.admin("GET", "/api/sync/runs", None).await;
    assert_eq!(runs["total"], 0, "rejected sheets do not start a run");

    let (status, _) = t
        .admin("POST", "/api/sync/offerings/rows", Some(rows_body(&[&["Name"]])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Tithes
// =============================================================================

#[tokio::test]
async fn test_tithe_sync() {
    let t = TestApp::new().await;
    let ama = t.member("Ama", "Mensah", Some("0241111111")).await;
    t.member("Kofi", "Boateng", None).await;

    let rows: &[&[&str]] = &[
        &["Member", "Phone", "Amount", "Date", "Method"],
        &["Ama Mensah", "0241111111", "GHS 50.00", "03/03/2024", "MoMo"],
        &["Kofi Boatang", "", "1,200", "10/03/2024", ""],
        &["", "0241111111", "50", "2024-03-03", "cash"],
        &["Stranger Person", "", "10", "03/03/2024", ""],
        &["Ama Mensah", "", "12x5", "03/03/2024", ""],
    ];

    let (status, summary) = t.admin("POST", "/api/sync/tithes/rows", Some(rows_body(rows))).await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["total_rows"], 5);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["duplicates"], 1);
    assert_eq!(summary["invalid"], 2);

    assert_eq!(issue_at(&summary, 4)["kind"], "duplicate");
    assert!(issue_at(&summary, 5)["reason"].as_str().unwrap().contains("member not found"));
    assert!(issue_at(&summary, 6)["reason"].as_str().unwrap().contains("not a number"));

    let (_, tithes) = t.admin("GET", "/api/tithes", None).await;
    assert_eq!(tithes["total"], 2);
    assert_eq!(tithes["total_amount_cents"], 125000);

    let (_, ama_tithes) = t.admin("GET", &format!("/api/tithes?member_id={}", ama), None).await;
    assert_eq!(ama_tithes["items"][0]["method"], "mobile_money");
    assert_eq!(ama_tithes["items"][0]["paid_on"], "2024-03-03");

    // Re-running the same sheet inserts nothing new
    let (_, again) = t.admin("POST", "/api/sync/tithes/rows", Some(rows_body(rows))).await;
    assert_eq!(again["inserted"], 0);
    assert_eq!(again["duplicates"], 3);
}

// =============================================================================
// Attendance (from the spreadsheet source)
// =============================================================================

#[tokio::test]
async fn test_attendance_sync_from_sheet() {
    let t = TestApp::new().await;
    t.member("Ama", "Mensah", None).await;
    t.member("Kofi", "Boateng", None).await;

    t.sheets
        .set_range(
            "Attendance!A1:Z",
            sheet(&[
                &["Name", "Date", "Service"],
                &["Ama Mensah", "2024-03-03", ""],
                &["Ama Mensah", "03/03/2024", "sunday service"],
                &["Kofi Boateng", "2024-03-06", "Midweek"],
                &["Ama Mensah", "31/02/2024", ""],
            ]),
        )
        .await;

    let (status, summary) = t.admin("POST", "/api/sync/attendance", None).await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["source"], "memory:Attendance!A1:Z");
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["duplicates"], 1);
    assert_eq!(summary["invalid"], 1);
    assert!(issue_at(&summary, 5)["reason"].as_str().unwrap().contains("invalid date"));

    let (_, services) = t.admin("GET", "/api/attendance", None).await;
    assert_eq!(services["total"], 2);
    let sunday = services["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["service_date"] == "2024-03-03")
        .unwrap();
    assert_eq!(sunday["service_type"], "Sunday Service");
    assert_eq!(sunday["present_count"], 1);
}

#[tokio::test]
async fn test_sheet_sync_with_missing_range_is_upstream_error() {
    let t = TestApp::new().await;

    let (status, body) = t.admin("POST", "/api/sync/members", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_insert_is_recorded_and_run_continues() {
    let t = TestApp::new().await;
    sqlx::query(
        "CREATE TRIGGER reject_broken_member BEFORE INSERT ON members \
         WHEN NEW.first_name = 'Broken' BEGIN SELECT RAISE(ABORT, 'member rejected'); END",
    )
    .execute(&t.pool)
    .await
    .unwrap();

    let (status, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[
                &["Name", "Phone"],
                &["Kofi Boateng", "0242222222"],
                &["Broken Row", "0249999999"],
                &["Esi Quaye", "0243333333"],
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["total_rows"], 3);
    assert_eq!(summary["inserted"], 2);
    assert_eq!(summary["failed"], 1);

    let failed = issue_at(&summary, 3);
    assert_eq!(failed["kind"], "failed");
    assert!(failed["reason"].as_str().unwrap().contains("import failed"));
    assert_eq!(failed["payload"]["Name"], "Broken Row");

    let (_, run) = t
        .admin("GET", &format!("/api/sync/runs/{}", summary["run_id"].as_str().unwrap()), None)
        .await;
    assert_eq!(run["failed"], 1);
    assert!(run["finished_at"].is_string());
}

#[tokio::test]
async fn test_lookup_errors_fail_rows_and_finish_run() {
    let t = TestApp::new().await;
    t.member("Ama", "Mensah", Some("0241111111")).await;
    sqlx::query("ALTER TABLE tithes RENAME TO tithes_archive")
        .execute(&t.pool)
        .await
        .unwrap();

    let (status, summary) = t
        .admin(
            "POST",
            "/api/sync/tithes/rows",
            Some(rows_body(&[
                &["Phone", "Amount", "Date"],
                &["0241111111", "20", "2024-03-03"],
                &["0241111111", "30", "2024-03-10"],
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["inserted"], 0);
    assert_eq!(summary["failed"], 2);

    let (_, runs) = t.admin("GET", "/api/sync/runs", None).await;
    assert_eq!(runs["total"], 1);
    assert!(runs["items"][0]["finished_at"].is_string(), "run is closed");
    assert_eq!(runs["items"][0]["failed"], 2);
}

// =============================================================================
// Runs and issues
// =============================================================================

#[tokio::test]
async fn test_run_history_and_issue_listing() {
    let t = TestApp::new().await;
    t.member("Ama", "Mensah", Some("0241111111")).await;

    t.sheets
        .set_range(
            "Members!A1:Z",
            sheet(&[&["Name", "Phone"], &["Ama Mensah", "0241111111"], &["Kofi", ""]]),
        )
        .await;

    let (status, summary) = t.admin("POST", "/api/sync/members", None).await;
    assert_eq!(status, StatusCode::OK);
    let run_id = summary["run_id"].as_str().unwrap();

    let (_, runs) = t.admin("GET", "/api/sync/runs", None).await;
    assert_eq!(runs["total"], 1);
    assert_eq!(runs["items"][0]["source"], "memory:Members!A1:Z");
    assert!(runs["items"][0]["finished_at"].is_string());

    let (status, run) = t.admin("GET", &format!("/api/sync/runs/{}", run_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["total_rows"], 2);
    assert_eq!(run["issues"].as_array().unwrap().len(), 2);

    let (_, open) = t
        .admin("GET", "/api/sync/issues?status=open&dataset=members", None)
        .await;
    assert_eq!(open["total"], 2);

    let (_, none) = t.admin("GET", "/api/sync/issues?dataset=tithes", None).await;
    assert_eq!(none["total"], 0);

    let (status, _) = t.admin("GET", "/api/sync/runs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolve_overwrite_updates_matched_member() {
    let t = TestApp::new().await;
    let (status, created) = t
        .admin(
            "POST",
            "/api/members",
            Some(json!({
                "first_name": "Ama",
                "last_name": "Mensah",
                "phone": "0241111111",
                "occupation": "Nurse",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let ama = created["id"].as_str().unwrap().to_string();

    let (_, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[
                &["Name", "Phone", "Email", "Occupation"],
                &["Ama Mensah", "024 111 1111", "ama@example.com", ""],
            ])),
        )
        .await;
    let issue_id = issue_at(&summary, 2)["id"].as_str().unwrap().to_string();
    let uri = format!("/api/sync/issues/{}/resolve", issue_id);

    let (status, outcome) = t.admin("POST", &uri, Some(json!({ "action": "overwrite" }))).await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["issue"]["status"], "overwritten");
    assert_eq!(outcome["record_id"], ama.as_str());
    assert!(outcome["issue"]["resolved_at"].is_string());

    let (_, member) = t.admin("GET", &format!("/api/members/{}", ama), None).await;
    assert_eq!(member["email"], "ama@example.com");
    assert_eq!(member["occupation"], "Nurse", "blank cells keep stored values");
    assert_eq!(member["phone"], "233241111111");

    let (status, _) = t.admin("POST", &uri, Some(json!({ "action": "dismiss" }))).await;
    assert_eq!(status, StatusCode::CONFLICT, "issues resolve once");
}

#[tokio::test]
async fn test_resolve_force_create_and_dismiss() {
    let t = TestApp::new().await;

    let (_, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[
                &["Name", "Phone"],
                &["Esi", "0243333333"],
                &["Yaw", ""],
            ])),
        )
        .await;
    assert_eq!(summary["invalid"], 2);
    let esi_issue = issue_at(&summary, 2)["id"].as_str().unwrap().to_string();
    let yaw_issue = issue_at(&summary, 3)["id"].as_str().unwrap().to_string();
    let esi_uri = format!("/api/sync/issues/{}/resolve", esi_issue);

    let (status, _) = t
        .admin("POST", &esi_uri, Some(json!({ "action": "overwrite" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "overwrite needs a duplicate member row");

    let (status, _) = t
        .admin("POST", &esi_uri, Some(json!({ "action": "force_create" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "stored row is still invalid");

    let (status, outcome) = t
        .admin(
            "POST",
            &esi_uri,
            Some(json!({ "action": "force_create", "row": { "Name": "Esi Quaye", "Phone": "0243333333" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", outcome);
    assert_eq!(outcome["issue"]["status"], "created");
    assert_eq!(outcome["issue"]["payload"]["Name"], "Esi Quaye", "amended row replaces payload");

    let member_id = outcome["record_id"].as_str().unwrap();
    let (_, member) = t.admin("GET", &format!("/api/members/{}", member_id), None).await;
    assert_eq!(member["last_name"], "Quaye");

    let (status, outcome) = t
        .admin(
            "POST",
            &format!("/api/sync/issues/{}/resolve", yaw_issue),
            Some(json!({ "action": "dismiss" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["issue"]["status"], "dismissed");
    assert!(outcome["record_id"].is_null());

    let (_, open) = t.admin("GET", "/api/sync/issues?status=open", None).await;
    assert_eq!(open["total"], 0);
}

#[tokio::test]
async fn test_overwrite_with_taken_phone_leaves_issue_open() {
    let t = TestApp::new().await;
    let ama = t.member("Ama", "Mensah", Some("0241111111")).await;
    t.member("Kofi", "Boateng", Some("0242222222")).await;

    let (_, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[&["Name", "Phone"], &["Ama Mensah", "0241111111"]])),
        )
        .await;
    let issue = issue_at(&summary, 2);
    assert_eq!(issue["existing_id"], ama.as_str());
    let issue_id = issue["id"].as_str().unwrap().to_string();
    let uri = format!("/api/sync/issues/{}/resolve", issue_id);

    let (status, body) = t
        .admin(
            "POST",
            &uri,
            Some(json!({ "action": "overwrite", "row": { "Name": "Ama Mensah", "Phone": "0242222222" } })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert!(body["error"]["message"].as_str().unwrap().contains("phone"));

    // The failed write does not close the issue or touch the member
    let (_, open) = t.admin("GET", "/api/sync/issues?status=open", None).await;
    assert_eq!(open["total"], 1);
    assert_eq!(open["items"][0]["id"], issue_id.as_str());
    assert_eq!(open["items"][0]["payload"]["Phone"], "0241111111");

    let (_, member) = t.admin("GET", &format!("/api/members/{}", ama), None).await;
    assert_eq!(member["phone"], "233241111111");

    let (status, _) = t.admin("POST", &uri, Some(json!({ "action": "dismiss" }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_second_force_create_is_conflict() {
    let t = TestApp::new().await;

    let (_, summary) = t
        .admin(
            "POST",
            "/api/sync/members/rows",
            Some(rows_body(&[&["Name", "Phone"], &["Esi", "0243333333"]])),
        )
        .await;
    let uri = format!(
        "/api/sync/issues/{}/resolve",
        issue_at(&summary, 2)["id"].as_str().unwrap()
    );
    let amended = json!({ "action": "force_create", "row": { "Name": "Esi Quaye" } });

    let (status, _) = t.admin("POST", &uri, Some(amended.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.admin("POST", &uri, Some(amended)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, page) = t.admin("GET", "/api/members?q=quaye", None).await;
    assert_eq!(page["total"], 1, "only the first resolution created a member");
}

#[tokio::test]
async fn test_force_create_duplicate_tithe() {
    let t = TestApp::new().await;
    t.member("Ama", "Mensah", Some("0241111111")).await;

    let rows: &[&[&str]] = &[&["Phone", "Amount", "Date"], &["0241111111", "20", "2024-03-03"]];
    t.admin("POST", "/api/sync/tithes/rows", Some(rows_body(rows))).await;
    let (_, summary) = t.admin("POST", "/api/sync/tithes/rows", Some(rows_body(rows))).await;
    let issue = issue_at(&summary, 2);
    assert_eq!(issue["kind"], "duplicate");

    let (status, _) = t
        .admin(
            "POST",
            &format!("/api/sync/issues/{}/resolve", issue["id"].as_str().unwrap()),
            Some(json!({ "action": "force_create" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, tithes) = t.admin("GET", "/api/tithes", None).await;
    assert_eq!(tithes["total"], 2, "second gift on the same day was recorded");
}

// =============================================================================
// Permissions
// =============================================================================

#[tokio::test]
async fn test_sync_permissions_follow_dataset() {
    let t = TestApp::new().await;
    t.member("Ama", "Mensah", Some("0241111111")).await;
    let finance = t.user_with_role("treasurer", "finance").await;
    let secretary = t.user_with_role("sec", "secretary").await;
    let pastor = t.user_with_role("pastor", "pastor").await;

    let members = rows_body(&[&["Name"], &["Kofi Boateng"]]);
    let tithes = rows_body(&[&["Phone", "Amount", "Date"], &["0241111111", "20", "2024-03-03"]]);

    let (status, _) = t
        .call("POST", "/api/sync/members/rows", Some(&finance), Some(members.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call("POST", "/api/sync/tithes/rows", Some(&finance), Some(tithes.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .call("POST", "/api/sync/tithes/rows", Some(&secretary), Some(tithes))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call("POST", "/api/sync/members/rows", Some(&secretary), Some(members.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .call("POST", "/api/sync/members/rows", Some(&pastor), Some(members))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "pastors do not run sync");

    let (status, _) = t.call("GET", "/api/sync/issues", Some(&pastor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
