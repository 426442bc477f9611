use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::domain::{DeviceConsumptionRow, StatisticMetadata, StatisticRow};

/// Write (or overwrite) hourly rows of a statistic series.
///
/// The metadata row and all statistic rows are written in one transaction.
/// Rows with an existing `(statistic_id, start)` have their `sum` replaced.
pub async fn insert_statistics(
    pool: &PgPool,
    metadata: &StatisticMetadata,
    rows: &[StatisticRow],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO statistics_meta
            (statistic_id, source, name, unit_of_measurement, has_mean, has_sum)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (statistic_id) DO UPDATE SET
            source = EXCLUDED.source,
            name = EXCLUDED.name,
            unit_of_measurement = EXCLUDED.unit_of_measurement,
            has_mean = EXCLUDED.has_mean,
            has_sum = EXCLUDED.has_sum
        "#,
    )
    .bind(&metadata.statistic_id)
    .bind(&metadata.source)
    .bind(&metadata.name)
    .bind(&metadata.unit_of_measurement)
    .bind(metadata.has_mean)
    .bind(metadata.has_sum)
    .execute(&mut *tx)
    .await?;

    if !rows.is_empty() {
        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO statistics (statistic_id, start, sum) ");
        builder.push_values(rows, |mut b, row| {
            b.push_bind(&metadata.statistic_id)
                .push_bind(row.start)
                .push_bind(row.sum);
        });
        builder.push(" ON CONFLICT (statistic_id, start) DO UPDATE SET sum = EXCLUDED.sum");
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete every row of a statistic series. Returns the number of rows removed.
pub async fn clear_statistics(pool: &PgPool, statistic_id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM statistics WHERE statistic_id = $1")
        .bind(statistic_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Hourly consumption rows of the given device entities with `start <= ts <= end`.
pub async fn device_consumption(
    pool: &PgPool,
    entity_ids: &[String],
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<DeviceConsumptionRow>> {
    let rows = sqlx::query_as::<_, DeviceConsumptionRow>(
        r#"
        SELECT ts, entity_id, change
        FROM device_consumption_hourly
        WHERE entity_id = ANY($1)
          AND ts >= $2
          AND ts <= $3
        ORDER BY ts
        "#,
    )
    .bind(entity_ids)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
