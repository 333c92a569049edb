use chrono::{Duration, Utc};
use court_engine::{CartManagement, CourtError, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Marks active carts that have been idle for longer than `idle_timeout` as abandoned, every `period`.
/// Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_abandoned_cart_worker(
    db: SqliteDatabase,
    idle_timeout: Duration,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🛒️ Abandoned cart worker started. Carts idle for {} minutes are abandoned", idle_timeout.num_minutes());
        loop {
            timer.tick().await;
            match abandon_idle_carts(&db, idle_timeout).await {
                Ok(0) => trace!("🛒️ No idle carts"),
                Ok(n) => info!("🛒️ {n} idle cart(s) abandoned"),
                Err(e) => error!("🛒️ Error running the abandoned cart job: {e}"),
            }
        }
    })
}

pub async fn abandon_idle_carts<B: CartManagement>(db: &B, idle_timeout: Duration) -> Result<usize, CourtError> {
    let idle_since = Utc::now() - idle_timeout;
    let abandoned = db.abandon_idle_carts(idle_since).await?;
    if !abandoned.is_empty() {
        debug!("🛒️ Abandoned carts: {abandoned:?}");
    }
    Ok(abandoned.len())
}
