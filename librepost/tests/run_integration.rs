//! End-to-end runs against the mock platform with real history and cursor files

use std::fs;
use std::time::Duration;

use librepost::error::PlatformError;
use librepost::platforms::mock::MockPlatform;
use librepost::poster::{RetryPolicy, RunPlan};
use librepost::selector::{self, SelectionFilter};
use librepost::{CursorStore, HistoryStore, MediaRef, PostRecord, RepostRunner, RunStatus};
use tempfile::TempDir;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_rate_limit_wait: Duration::from_secs(1),
    }
}

fn feed(source: &str, ids: &[&str]) -> Vec<PostRecord> {
    ids.iter().map(|id| PostRecord::new(*id, source)).collect()
}

fn plan(accounts: &[&str], quota: usize) -> RunPlan {
    RunPlan {
        accounts: accounts.iter().map(|s| s.to_string()).collect(),
        fetch_limit: 10,
        quota,
        use_cursors: false,
    }
}

#[tokio::test]
async fn test_run_reposts_and_persists_history() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("posted_history.json");

    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["A", "B", "C"]));
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform))
        .with_retry(fast_retry())
        .persist_history_to(history_path.clone());

    let mut history = HistoryStore::load_or_empty(&history_path);
    let mut cursors = CursorStore::new();
    let report = runner
        .run(&plan(&["nasa"], 2), &mut history, &mut cursors)
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.reposted, vec!["A", "B"]);
    assert_eq!(calls.lock().unwrap().reposted, vec!["A", "B"]);

    // Saved after each repost, before the caller's final save
    let on_disk = HistoryStore::load(&history_path).unwrap();
    assert_eq!(on_disk.ids(), &["A".to_string(), "B".to_string()]);

    let raw = fs::read_to_string(&history_path).unwrap();
    let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, vec!["A", "B"]);
}

#[tokio::test]
async fn test_second_run_skips_already_reposted() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.json");
    fs::write(&history_path, r#"["A"]"#).unwrap();

    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["A", "B"]));
    let mut runner = RepostRunner::new(Box::new(platform)).persist_history_to(history_path.clone());

    let mut history = HistoryStore::load_or_empty(&history_path);
    let report = runner
        .run(&plan(&["nasa"], 5), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.eligible, 1);
    assert_eq!(report.reposted, vec!["B"]);
    assert_eq!(history.ids(), &["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn test_failed_repost_is_not_marked() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.json");
    fs::write(&history_path, r#"["A"]"#).unwrap();

    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["A", "B"]))
        .with_repost_error("B", PlatformError::Api("403 Forbidden".to_string()));
    let mut runner = RepostRunner::new(Box::new(platform))
        .with_retry(fast_retry())
        .persist_history_to(history_path.clone());

    let mut history = HistoryStore::load_or_empty(&history_path);
    let report = runner
        .run(&plan(&["nasa"], 5), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(history.ids(), &["A".to_string()]);
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "B");

    let on_disk = HistoryStore::load(&history_path).unwrap();
    assert_eq!(on_disk.ids(), &["A".to_string()]);
}

#[tokio::test]
async fn test_partial_failure_continues_with_next_item() {
    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["A", "B", "C"]))
        .with_repost_error("B", PlatformError::Api("duplicate".to_string()));
    let mut runner = RepostRunner::new(Box::new(platform)).with_retry(fast_retry());

    let mut history = HistoryStore::new();
    let report = runner
        .run(&plan(&["nasa"], 3), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.reposted, vec!["A", "C"]);
    assert!(!history.contains("B"));
}

#[tokio::test]
async fn test_corrupt_history_fails_open() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.json");
    fs::write(&history_path, "{ not json").unwrap();

    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["A"]));
    let mut runner = RepostRunner::new(Box::new(platform));

    let mut history = HistoryStore::load_or_empty(&history_path);
    assert!(history.is_empty());

    let report = runner
        .run(&plan(&["nasa"], 1), &mut history, &mut CursorStore::new())
        .await
        .unwrap();
    assert_eq!(report.reposted, vec!["A"]);

    history.save(&history_path).unwrap();
    assert_eq!(HistoryStore::load(&history_path).unwrap().ids(), &["A".to_string()]);
}

#[tokio::test]
async fn test_nothing_new_is_idle() {
    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["A"]));
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform));

    let mut history = HistoryStore::from_ids(["A"]);
    let report = runner
        .run(&plan(&["nasa"], 1), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Idle);
    assert_eq!(report.exit_code(), 0);
    assert!(calls.lock().unwrap().repost_attempts.is_empty());
}

#[tokio::test]
async fn test_authentication_failure_aborts_before_fetching() {
    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["A"]))
        .with_auth_error("token revoked");
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform));

    let err = runner
        .run(&plan(&["nasa"], 1), &mut HistoryStore::new(), &mut CursorStore::new())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert!(calls.lock().unwrap().fetches.is_empty());
}

#[tokio::test]
async fn test_one_failing_account_does_not_block_others() {
    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["A"]))
        .with_fetch_error("esa", PlatformError::Network("connection refused".to_string()));
    let mut runner = RepostRunner::new(Box::new(platform)).with_retry(fast_retry());

    let mut history = HistoryStore::new();
    let report = runner
        .run(&plan(&["esa", "nasa"], 1), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.accounts_polled, 2);
    assert_eq!(report.fetch_failures.len(), 1);
    assert_eq!(report.reposted, vec!["A"]);
}

#[tokio::test]
async fn test_duplicates_across_accounts_reposted_once() {
    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["X1", "N1"]))
        .with_feed("esa", feed("esa", &["X1", "E1"]));
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform));

    let mut history = HistoryStore::new();
    let report = runner
        .run(&plan(&["nasa", "esa"], 10), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.candidates, 4);
    assert_eq!(report.selected, 3);
    let reposted = calls.lock().unwrap().reposted.clone();
    assert_eq!(reposted.iter().filter(|id| *id == "X1").count(), 1);
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_media_filter_skips_text_posts() {
    let platform = MockPlatform::new("mock").with_feed(
        "nasa",
        vec![
            PostRecord::new("3", "nasa"),
            PostRecord::new("2", "nasa").with_media(MediaRef::photo("3_2", "https://pbs.twimg.com/2.jpg")),
            PostRecord::new("1", "nasa").as_repost(),
        ],
    );
    let mut runner = RepostRunner::new(Box::new(platform)).with_filter(SelectionFilter {
        require_media: true,
        include_reposts: false,
    });

    let mut history = HistoryStore::new();
    let report = runner
        .run(&plan(&["nasa"], 5), &mut history, &mut CursorStore::new())
        .await
        .unwrap();

    assert_eq!(report.eligible, 1);
    assert_eq!(report.reposted, vec!["2"]);
}

#[tokio::test]
async fn test_cursor_advances_only_when_drained() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("since.json");

    let platform = MockPlatform::new("mock")
        .with_feed("nasa", feed("nasa", &["30", "20"]))
        .with_feed("esa", feed("esa", &["15"]));
    let mut runner = RepostRunner::new(Box::new(platform));

    // Quota 1: nasa's newest post is taken, "20" stays pending
    let run_plan = RunPlan {
        use_cursors: true,
        ..plan(&["nasa", "esa"], 1)
    };
    let mut history = HistoryStore::from_ids(["15"]);
    let mut cursors = CursorStore::load_or_empty(&cursor_path);
    let report = runner.run(&run_plan, &mut history, &mut cursors).await.unwrap();

    assert_eq!(report.reposted, vec!["30"]);
    assert_eq!(cursors.get("nasa"), None);
    assert_eq!(cursors.get("esa"), Some("15"));

    cursors.save(&cursor_path).unwrap();
    let reloaded = CursorStore::load(&cursor_path).unwrap();
    assert_eq!(reloaded.get("esa"), Some("15"));
}

#[tokio::test]
async fn test_cursor_limits_next_fetch() {
    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["30", "20"]));
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform));

    let run_plan = RunPlan {
        use_cursors: true,
        ..plan(&["nasa"], 5)
    };
    let mut history = HistoryStore::new();
    let mut cursors = CursorStore::new();

    runner.run(&run_plan, &mut history, &mut cursors).await.unwrap();
    assert_eq!(cursors.get("nasa"), Some("30"));

    let second = runner.run(&run_plan, &mut history, &mut cursors).await.unwrap();
    assert_eq!(second.candidates, 0);
    assert_eq!(
        calls.lock().unwrap().fetches[1].1.since_id.as_deref(),
        Some("30")
    );
}

#[tokio::test]
async fn test_dry_run_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let history_path = dir.path().join("history.json");

    let platform = MockPlatform::new("mock").with_feed("nasa", feed("nasa", &["A", "B"]));
    let calls = platform.calls();
    let mut runner = RepostRunner::new(Box::new(platform))
        .persist_history_to(history_path.clone())
        .dry_run(true);

    let mut history = HistoryStore::new();
    let mut cursors = CursorStore::new();
    let run_plan = RunPlan {
        use_cursors: true,
        ..plan(&["nasa"], 2)
    };
    let report = runner.run(&run_plan, &mut history, &mut cursors).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.selected, 2);
    assert_eq!(report.status(), RunStatus::Completed);
    assert!(history.is_empty());
    assert!(cursors.is_empty());
    assert!(!history_path.exists());
    assert!(calls.lock().unwrap().repost_attempts.is_empty());
}

#[test]
fn test_selection_is_idempotent_before_reposting() {
    let candidates = feed("nasa", &["A", "B", "C"]);
    let history = HistoryStore::from_ids(["B"]);

    let first = selector::select(&candidates, &history, 2);
    let second = selector::select(&candidates, &history, 2);
    assert_eq!(first, second);
}
