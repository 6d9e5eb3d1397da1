//! Background task that deletes expired sessions.

use std::time::Duration;

use agora_db::pool::DbPool;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Delete every session whose expiry has passed. Returns the number removed.
pub fn purge_expired_sessions(db: &DbPool) -> agora_core::Result<usize> {
    let conn = agora_db::pool::get_conn(db)?;
    agora_db::queries::sessions::delete_expired_sessions(&conn, &agora_db::time::now())
}

/// Run the session sweeper until `cancel` fires.
pub async fn run_session_sweeper(ctx: AppContext, cancel: CancellationToken) {
    let every = Duration::from_secs(ctx.config.auth.sweep_interval_secs.max(1));
    let mut interval = tokio::time::interval(every);
    tracing::info!("Session sweeper started (every {}s)", every.as_secs());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper shutting down");
                break;
            }
            _ = interval.tick() => {
                let db = ctx.db.clone();
                match tokio::task::spawn_blocking(move || purge_expired_sessions(&db)).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(n)) => tracing::debug!("Purged {n} expired sessions"),
                    Ok(Err(e)) => tracing::warn!("Session sweep failed: {e}"),
                    Err(e) => tracing::error!("Session sweep task panicked: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::config::Config;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn purge_removes_only_expired() {
        let db = agora_db::pool::init_memory_pool().unwrap();
        let conn = agora_db::pool::get_conn(&db).unwrap();
        let user = agora_db::queries::users::create_user(
            &conn,
            &agora_db::queries::users::NewUser {
                email: "sweep@example.com",
                password_hash: "x",
                first_name: "S",
                last_name: "W",
                date_of_birth: "1990-01-01",
                nickname: None,
                about_me: None,
                avatar: None,
                is_public: true,
            },
        )
        .unwrap();

        let past = agora_db::time::format(Utc::now() - ChronoDuration::hours(1));
        let future = agora_db::time::format(Utc::now() + ChronoDuration::hours(1));
        agora_db::queries::sessions::create_session(&conn, user.id, "old", &past).unwrap();
        agora_db::queries::sessions::create_session(&conn, user.id, "new", &future).unwrap();
        drop(conn);

        assert_eq!(purge_expired_sessions(&db).unwrap(), 1);
        assert_eq!(purge_expired_sessions(&db).unwrap(), 0);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let db = agora_db::pool::init_memory_pool().unwrap();
        let ctx = AppContext::new(db, Config::default());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session_sweeper(ctx, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
