use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// Advisory locks are scoped to the Postgres session. Best-effort guard
// against two workers generating the same (client, trading_date) at once.
const LOCK_NAMESPACE: i64 = 0x4441_5942_5246; // "DAYBRF"

fn lock_key(client_id: &str, trading_date: NaiveDate) -> i64 {
    let mut hasher = DefaultHasher::new();
    client_id.hash(&mut hasher);
    let client_hash = hasher.finish() as i64;
    LOCK_NAMESPACE ^ client_hash ^ i64::from(trading_date.num_days_from_ce())
}

pub async fn try_acquire_report_lock(
    pool: &sqlx::PgPool,
    client_id: &str,
    trading_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key(client_id, trading_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_report_lock(
    pool: &sqlx::PgPool,
    client_id: &str,
    trading_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key(client_id, trading_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_differ_per_client_and_date() {
        let d1 = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 8, 22).unwrap();
        assert_ne!(lock_key("a", d1), lock_key("b", d1));
        assert_ne!(lock_key("a", d1), lock_key("a", d2));
        assert_eq!(lock_key("a", d1), lock_key("a", d1));
    }
}
