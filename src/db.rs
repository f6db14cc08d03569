use sqlx::MySqlPool;

pub async fn init_db(database_url: &str) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Creates the punch log table on first start.
pub async fn ensure_schema(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance_logs (
            sn           INT UNSIGNED PRIMARY KEY,
            user_id      VARCHAR(50) NOT NULL,
            name         VARCHAR(255) NOT NULL,
            record_time  DATETIME NOT NULL,
            type         TINYINT UNSIGNED NOT NULL,
            state        TINYINT UNSIGNED NOT NULL,
            device_id    VARCHAR(64) NOT NULL,
            updated_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
