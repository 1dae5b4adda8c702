use sqlx::postgres::PgPool;

/// Schema statements, applied in order. Every statement is idempotent so the
/// list can run on each startup.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_records",
        r#"
        CREATE TABLE IF NOT EXISTS records (
            kind TEXT NOT NULL,
            id BIGSERIAL PRIMARY KEY,
            patient_id BIGINT NULL,
            jurisdiction_id BIGINT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            data JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "002_index_records_patient",
        "CREATE INDEX IF NOT EXISTS records_kind_patient_idx ON records (kind, patient_id)",
    ),
    (
        "003_index_records_jurisdiction",
        "CREATE INDEX IF NOT EXISTS records_kind_jurisdiction_idx ON records (kind, jurisdiction_id)",
    ),
    (
        "004_index_records_updated",
        "CREATE INDEX IF NOT EXISTS records_kind_updated_idx ON records (kind, updated_at)",
    ),
    (
        "005_index_access_tokens",
        "CREATE INDEX IF NOT EXISTS records_access_token_idx ON records ((data->>'token')) WHERE kind = 'access_token'",
    ),
];

/// Creates the migrations tracker and applies any migration not yet recorded
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    init_migrations_tracker(pool).await?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM migrations WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if applied.is_some() {
            continue;
        }

        tracing::info!("Running migration: {}", name);
        sqlx::query(sql).execute(pool).await?;
        record_migration(pool, name).await?;
    }

    tracing::info!("✓ Database schema up to date");
    Ok(())
}

async fn init_migrations_tracker(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_migration(pool: &PgPool, name: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_names_are_unique_and_ordered() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }
}
