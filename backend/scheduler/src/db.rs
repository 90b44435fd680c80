//! Database layer — migrations and rotation-event journal queries.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, RotationEvent};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Journal a single rotation event.
pub async fn insert_event(pool: &SqlitePool, event: &RotationEvent) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO rotation_events
            (chain_id, event_type, member_id, loan_id, amount, round, occurred_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&event.chain_id)
    .bind(event.kind.as_str())
    .bind(&event.member_id)
    .bind(event.loan_id.map(|id| id as i64))
    .bind(event.amount.map(|a| a.to_string()))
    .bind(event.round.map(i64::from))
    .bind(event.occurred_at.timestamp())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Fetch the full journal for a chain, oldest first.
pub async fn get_events_for_chain(pool: &SqlitePool, chain_id: &str) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, chain_id, event_type, member_id, loan_id, amount, round,
               occurred_at, created_at
        FROM   rotation_events
        WHERE  chain_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(chain_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    // A single connection: every connection to `sqlite::memory:` opens its
    // own database, so a larger pool would lose the migrated schema.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn events_insert_and_read_back_in_order() {
        let pool = memory_pool().await;
        let at = Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap();

        insert_event(
            &pool,
            &RotationEvent::new("chain-1", EventKind::RoundAdvanced, at).round(2),
        )
        .await
        .unwrap();
        insert_event(
            &pool,
            &RotationEvent::new("chain-1", EventKind::ContributionRecorded, at)
                .member("alice")
                .amount(1_000),
        )
        .await
        .unwrap();
        insert_event(
            &pool,
            &RotationEvent::new("other-chain", EventKind::MemberJoined, at).member("zed"),
        )
        .await
        .unwrap();

        let events = get_events_for_chain(&pool, "chain-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "round_advanced");
        assert_eq!(events[0].round, Some(2));
        assert_eq!(events[1].event_type, "contribution_recorded");
        assert_eq!(events[1].member_id.as_deref(), Some("alice"));
        assert_eq!(events[1].amount.as_deref(), Some("1000"));
        assert_eq!(events[1].occurred_at, at.timestamp());
    }
}
