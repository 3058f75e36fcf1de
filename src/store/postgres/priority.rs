//! Priority calculator (C4): recomputes derived signals and the composite
//! priority score for every non-terminal domain in one atomic statement.

use crate::config::PriorityConfig;
use crate::store::postgres::pool::PgStore;
use crate::CoordinatorError;
use chrono::{DateTime, NaiveDate, Utc};

/// Recomputes `image_yield_rate`, `avg_images_per_page`, `error_rate`, and
/// `priority_score` for every domain whose status is not `blocked` or
/// `unreachable` (spec §4.4). Returns the number of rows touched.
///
/// The formula, verbatim from spec §4.4:
///
/// ```text
/// priority_score =
///     -seed_rank                                        (0 if seed_rank is null)
///   + round(image_yield_rate * 1000)                     (0 if pages_crawled = 0)
///   + least(greatest(pages_discovered - pages_crawled, 0), 500) * 2
///   - round(error_rate * 500)                             (0 if pages_crawled = 0)
///   + floor(staleness_days * 5)
/// ```
///
/// `staleness_days` uses `never_crawled_epoch` (spec §9's configurable
/// epoch) in place of a null `last_crawled_at`.
pub async fn recalculate_priorities(
    store: &PgStore,
    config: &PriorityConfig,
) -> Result<u64, CoordinatorError> {
    let pool = store.get_pool().await?;
    let epoch = never_crawled_epoch_as_datetime(config.never_crawled_epoch);

    let result = sqlx::query(
        "UPDATE domains SET \
         image_yield_rate = CASE WHEN pages_crawled = 0 THEN NULL \
             ELSE images_stored::float8 / pages_crawled END, \
         avg_images_per_page = CASE WHEN pages_crawled = 0 THEN NULL \
             ELSE images_found::float8 / pages_crawled END, \
         error_rate = CASE WHEN pages_crawled = 0 THEN NULL \
             ELSE total_error_count::float8 / pages_crawled END, \
         priority_score = ( \
             COALESCE(-seed_rank, 0) \
             + ROUND(CASE WHEN pages_crawled = 0 THEN 0 \
                 ELSE (images_stored::numeric / pages_crawled) * 1000 END) \
             + LEAST(GREATEST(pages_discovered - pages_crawled, 0), 500) * 2 \
             - ROUND(CASE WHEN pages_crawled = 0 THEN 0 \
                 ELSE (total_error_count::numeric / pages_crawled) * 500 END) \
             + FLOOR(EXTRACT(EPOCH FROM (now() - COALESCE(last_crawled_at, $1))) / 86400.0 * 5) \
         )::bigint, \
         priority_computed_at = now() \
         WHERE status NOT IN ('blocked', 'unreachable')",
    )
    .bind(epoch)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn never_crawled_epoch_as_datetime(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}
