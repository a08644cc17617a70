//! Integration tests for the quota ledger

use chrono::{Duration, Utc};
use quota_rs::config::DatabaseConfig;
use quota_rs::db;
use quota_rs::platform::Platform;
use quota_rs::quota::{
    CycleWindow, NewPost, Post, PostStatus, QuotaService, SubscriptionPlan,
};
use quota_rs::utils::{format_timestamp, parse_timestamp};
use quota_rs::QuotaError;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

async fn setup_service() -> QuotaService {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_schema(&pool).await.unwrap();
    QuotaService::new(pool)
}

async fn draft(service: &QuotaService, user_id: &str, platform: Platform) -> Post {
    service
        .create_draft(
            user_id,
            NewPost {
                platform,
                content: format!("Weekly tip for {}", platform),
                scheduled_for: Some(Utc::now() + Duration::hours(6)),
            },
        )
        .await
        .unwrap()
}

async fn approved(service: &QuotaService, user_id: &str) -> Post {
    let post = draft(service, user_id, Platform::Facebook).await;
    service.approve_post(user_id, &post.id).await.unwrap()
}

/// remaining = allowance - published posts in the current window, recomputed from scratch
async fn assert_invariant(service: &QuotaService, user_id: &str) {
    let status = service.get_quota_status(user_id).await.unwrap();
    let window = CycleWindow::starting_at(status.cycle_start);

    let published: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM posts
        WHERE user_id = ? AND status = 'published'
          AND published_at >= ? AND published_at < ?
        "#,
    )
    .bind(user_id)
    .bind(format_timestamp(window.start))
    .bind(format_timestamp(window.end))
    .fetch_one(service.pool())
    .await
    .unwrap();

    assert_eq!(status.published_posts, published);
    assert_eq!(status.remaining_posts, status.total_posts - published);
    assert!(status.remaining_posts >= 0);
}

#[tokio::test]
async fn test_professional_plan_exhausts_after_52_posts() {
    let service = setup_service().await;
    service
        .initialize_quota("pro-user", SubscriptionPlan::Professional)
        .await
        .unwrap();

    for i in 1..=52 {
        let post = approved(&service, "pro-user").await;
        let confirmation = service.post_approved("pro-user", &post.id).await.unwrap();
        assert!(confirmation.deducted);
        assert_eq!(confirmation.quota.remaining_posts, 52 - i);
    }

    let post = approved(&service, "pro-user").await;
    let result = service.post_approved("pro-user", &post.id).await;
    assert!(matches!(result, Err(QuotaError::QuotaExceeded { .. })));

    let status = service.get_quota_status("pro-user").await.unwrap();
    assert_eq!(status.published_posts, 52);
    assert_eq!(status.remaining_posts, 0);
    assert_invariant(&service, "pro-user").await;
}

#[tokio::test]
async fn test_zero_remaining_rejects_without_mutation() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    for _ in 0..12 {
        let post = approved(&service, "u1").await;
        service.post_approved("u1", &post.id).await.unwrap();
    }

    let before = service.get_quota_status("u1").await.unwrap();
    let pending = approved(&service, "u1").await;

    let result = service.post_approved("u1", &pending.id).await;
    assert!(matches!(result, Err(QuotaError::QuotaExceeded { .. })));

    let after = service.get_quota_status("u1").await.unwrap();
    assert_eq!(before, after);

    let pending = service.get_post("u1", &pending.id).await.unwrap();
    assert_eq!(pending.status, PostStatus::Approved);
    assert!(pending.published_at.is_none());
}

#[tokio::test]
async fn test_repeated_confirmation_deducts_once() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Growth)
        .await
        .unwrap();
    let post = approved(&service, "u1").await;

    let mut deductions = 0;
    for _ in 0..5 {
        if service.post_approved("u1", &post.id).await.unwrap().deducted {
            deductions += 1;
        }
    }

    assert_eq!(deductions, 1);
    assert_eq!(service.remaining_posts("u1").await.unwrap(), 26);
    assert_invariant(&service, "u1").await;
}

#[tokio::test]
async fn test_repeated_confirmation_when_exhausted_is_still_idempotent() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..12 {
        let post = approved(&service, "u1").await;
        service.post_approved("u1", &post.id).await.unwrap();
        last = Some(post);
    }

    // The last post is already published, confirming it again is not a new publish
    let last = last.unwrap();
    let confirmation = service.post_approved("u1", &last.id).await.unwrap();
    assert!(!confirmation.deducted);
    assert_eq!(confirmation.quota.remaining_posts, 0);
}

#[tokio::test]
async fn test_invariant_after_mixed_sequence() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();
    service
        .initialize_quota("u2", SubscriptionPlan::Growth)
        .await
        .unwrap();

    let mut posts = Vec::new();
    for (i, platform) in Platform::ALL.iter().cycle().take(15).enumerate() {
        let user = if i % 3 == 0 { "u2" } else { "u1" };
        posts.push((user, draft(&service, user, *platform).await));
    }

    for (i, (user, post)) in posts.iter().enumerate() {
        // Every fourth draft never gets approved
        if i % 4 == 3 {
            continue;
        }
        service.approve_post(user, &post.id).await.unwrap();

        match i % 5 {
            0 => {
                service.mark_failed(user, &post.id).await.unwrap();
            }
            1 => {
                service.mark_failed(user, &post.id).await.unwrap();
                service.approve_post(user, &post.id).await.unwrap();
                service.post_approved(user, &post.id).await.unwrap();
            }
            2 => {
                service.post_approved(user, &post.id).await.unwrap();
                service.post_approved(user, &post.id).await.unwrap();
            }
            _ => {
                service.post_approved(user, &post.id).await.unwrap();
            }
        }

        assert_invariant(&service, "u1").await;
        assert_invariant(&service, "u2").await;
    }

    assert!(service.validate_quota("u1").await.unwrap().valid);
    assert!(service.validate_quota("u2").await.unwrap().valid);
}

#[tokio::test]
async fn test_stale_cycle_rolls_forward_in_one_read() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    for _ in 0..4 {
        let post = approved(&service, "u1").await;
        service.post_approved("u1", &post.id).await.unwrap();
    }

    let stale_start = parse_timestamp(&format_timestamp(Utc::now() - Duration::days(61))).unwrap();
    sqlx::query("UPDATE users SET cycle_start = ? WHERE id = 'u1'")
        .bind(format_timestamp(stale_start))
        .execute(service.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE posts SET published_at = ? WHERE user_id = 'u1'")
        .bind(format_timestamp(stale_start + Duration::days(2)))
        .execute(service.pool())
        .await
        .unwrap();

    let status = service.get_quota_status("u1").await.unwrap();

    assert!(Utc::now() - status.cycle_start <= Duration::days(30));
    assert_eq!(status.cycle_start, stale_start + Duration::days(60));
    assert_eq!(status.cycle_end, status.cycle_start + Duration::days(30));
    assert_eq!(status.published_posts, 0);
    assert_eq!(status.remaining_posts, 12);
    assert_invariant(&service, "u1").await;

    // The roll was persisted
    let stored: String = sqlx::query_scalar("SELECT cycle_start FROM users WHERE id = 'u1'")
        .fetch_one(service.pool())
        .await
        .unwrap();
    assert_eq!(parse_timestamp(&stored).unwrap(), status.cycle_start);
}

#[tokio::test]
async fn test_publish_after_stale_cycle_counts_in_new_cycle() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    let stale_start = parse_timestamp(&format_timestamp(Utc::now() - Duration::days(45))).unwrap();
    sqlx::query("UPDATE users SET cycle_start = ?, published_count = 12 WHERE id = 'u1'")
        .bind(format_timestamp(stale_start))
        .execute(service.pool())
        .await
        .unwrap();

    // Exhausted in the old cycle, but the confirmation lands in a fresh one
    let post = approved(&service, "u1").await;
    let confirmation = service.post_approved("u1", &post.id).await.unwrap();

    assert!(confirmation.deducted);
    assert_eq!(confirmation.quota.cycle_start, stale_start + Duration::days(30));
    assert_eq!(confirmation.quota.published_posts, 1);
    assert_eq!(confirmation.quota.remaining_posts, 11);
    assert_invariant(&service, "u1").await;
}

#[tokio::test]
async fn test_validate_detects_under_reported_consumption() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Professional)
        .await
        .unwrap();

    for _ in 0..10 {
        let post = approved(&service, "u1").await;
        service.post_approved("u1", &post.id).await.unwrap();
    }

    // Cached ledger only reflects 8 of the 10 published posts
    sqlx::query("UPDATE users SET published_count = 8 WHERE id = 'u1'")
        .execute(service.pool())
        .await
        .unwrap();

    let validation = service.validate_quota("u1").await.unwrap();
    assert!(!validation.valid);
    assert!(!validation.issues.is_empty());
    assert!(validation.issues[0].contains("8"));
    assert!(validation.issues[0].contains("10"));

    // Reported, not repaired
    let status = service.get_quota_status("u1").await.unwrap();
    assert_eq!(status.published_posts, 8);

    match service.ensure_consistent("u1").await {
        Err(QuotaError::Integrity { user_id, issues }) => {
            assert_eq!(user_id, "u1");
            assert_eq!(issues, validation.issues);
        }
        other => panic!("expected integrity error, got {:?}", other),
    }

    let repaired = service.repair_quota("u1").await.unwrap();
    assert_eq!(repaired.published_posts, 10);
    assert_eq!(repaired.remaining_posts, 42);
    assert_invariant(&service, "u1").await;
}

#[tokio::test]
async fn test_content_generation_reads_remaining() {
    let service = setup_service().await;
    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    // Drafts and approvals are free
    for _ in 0..20 {
        approved(&service, "u1").await;
    }
    assert_eq!(service.remaining_posts("u1").await.unwrap(), 12);
}

#[tokio::test]
async fn test_concurrent_confirmations_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("quota.db").display()),
        max_connections: 4,
    })
    .await
    .unwrap();
    db::init_schema(&pool).await.unwrap();
    let service = Arc::new(QuotaService::new(pool));

    service
        .initialize_quota("u1", SubscriptionPlan::Starter)
        .await
        .unwrap();

    let mut posts = Vec::new();
    for _ in 0..20 {
        posts.push(approved(&service, "u1").await);
    }

    // Every post is confirmed twice, all at once
    let mut handles = Vec::new();
    for post in posts.iter().chain(posts.iter()) {
        let service = Arc::clone(&service);
        let post_id = post.id.clone();
        handles.push(tokio::spawn(async move {
            service.post_approved("u1", &post_id).await
        }));
    }

    let mut deducted = 0;
    let mut exceeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(confirmation) if confirmation.deducted => deducted += 1,
            Ok(_) => {}
            Err(QuotaError::QuotaExceeded { .. }) => exceeded += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(deducted, 12);
    assert!(exceeded >= 8);

    let status = service.get_quota_status("u1").await.unwrap();
    assert_eq!(status.published_posts, 12);
    assert_eq!(status.remaining_posts, 0);
    assert_invariant(&service, "u1").await;
    assert!(service.validate_quota("u1").await.unwrap().valid);
}

#[tokio::test]
async fn test_repair_runs_alongside_confirmations() {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("quota.db").display()),
        max_connections: 4,
    })
    .await
    .unwrap();
    db::init_schema(&pool).await.unwrap();
    let service = Arc::new(QuotaService::new(pool));

    service
        .initialize_quota("u1", SubscriptionPlan::Professional)
        .await
        .unwrap();

    let mut posts = Vec::new();
    for _ in 0..40 {
        posts.push(approved(&service, "u1").await);
    }

    let mut confirmations = Vec::new();
    let mut repairs = Vec::new();
    for post in &posts {
        let service_a = Arc::clone(&service);
        let post_id = post.id.clone();
        confirmations.push(tokio::spawn(async move {
            service_a.post_approved("u1", &post_id).await
        }));

        let service_b = Arc::clone(&service);
        repairs.push(tokio::spawn(async move {
            service_b.repair_quota("u1").await
        }));
    }

    let mut deducted = 0;
    for handle in confirmations {
        let confirmation = handle.await.unwrap().unwrap();
        if confirmation.deducted {
            deducted += 1;
        }
    }
    for handle in repairs {
        let status = handle.await.unwrap().unwrap();
        assert!(status.published_posts <= 40);
        assert_eq!(status.remaining_posts, 52 - status.published_posts);
    }

    assert_eq!(deducted, 40);

    let status = service.get_quota_status("u1").await.unwrap();
    assert_eq!(status.published_posts, 40);
    assert_eq!(status.remaining_posts, 12);
    assert_invariant(&service, "u1").await;
    assert!(service.validate_quota("u1").await.unwrap().valid);
}
