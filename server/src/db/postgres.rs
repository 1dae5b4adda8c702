use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use super::{
    migrations, resolve_link, DbConfig, MatchMode, RecordKind, RecordQuery, Store, StoreError,
    StoredRecord, Write,
};

const COLUMNS: &str =
    "kind, id, patient_id, jurisdiction_id, version, data, created_at, updated_at";

/// PostgreSQL-backed store over the `records` jsonb table
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, verifies the connection and applies the schema.
    pub async fn connect(config: &DbConfig<'_>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::info!("✓ Database connected successfully");

        migrations::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

fn decode_row(row: PgRow) -> Result<StoredRecord, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(StoredRecord {
        kind: kind.parse()?,
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        jurisdiction_id: row.try_get("jurisdiction_id")?,
        version: row.try_get("version")?,
        data: row.try_get::<Value, _>("data")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn push_conditions<'q>(builder: &mut QueryBuilder<'q, Postgres>, query: &'q RecordQuery) {
    builder.push(" WHERE kind = ");
    builder.push_bind(query.kind.as_str());

    if let Some(ids) = &query.ids {
        builder.push(" AND id = ANY(");
        builder.push_bind(ids.clone());
        builder.push(")");
    }
    if let Some(patient_ids) = &query.patient_ids {
        builder.push(" AND patient_id = ANY(");
        builder.push_bind(patient_ids.clone());
        builder.push(")");
    }
    if let Some(jurisdiction_ids) = &query.jurisdiction_ids {
        builder.push(" AND jurisdiction_id = ANY(");
        builder.push_bind(jurisdiction_ids.clone());
        builder.push(")");
    }
    if let Some(since) = query.updated_since {
        builder.push(" AND updated_at >= ");
        builder.push_bind(since);
    }
    for filter in &query.filters {
        builder.push(" AND (");
        for (i, field) in filter.fields.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push("lower(data->>");
            builder.push_bind(field.as_str());
            match filter.mode {
                MatchMode::Exact => {
                    builder.push(") = lower(");
                    builder.push_bind(filter.value.as_str());
                    builder.push(")");
                }
                MatchMode::Contains => {
                    builder.push(") LIKE ");
                    builder.push_bind(like_pattern(&filter.value));
                    builder.push(" ESCAPE '\\'");
                }
            }
        }
        builder.push(")");
    }
}

/// Lower-cased `%value%` with LIKE wildcards in `value` taken literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, kind: RecordKind, id: i64) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM records WHERE kind = $1 AND id = $2"
        ))
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_row).transpose()
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM records"));
        push_conditions(&mut builder, query);
        builder.push(" ORDER BY id");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn count(&self, query: &RecordQuery) -> Result<i64, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM records");
        push_conditions(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("count")?)
    }

    async fn apply(&self, writes: Vec<Write>) -> Result<Vec<StoredRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut applied: Vec<StoredRecord> = Vec::with_capacity(writes.len());

        for (index, write) in writes.into_iter().enumerate() {
            let row = match write {
                Write::Insert(new) => {
                    let patient_id = resolve_link(new.patient, index, &applied)?;
                    sqlx::query(&format!(
                        "INSERT INTO records (kind, patient_id, jurisdiction_id, version, data, created_at, updated_at)
                         VALUES ($1, $2, $3, 1, $4, NOW(), NOW())
                         RETURNING {COLUMNS}"
                    ))
                    .bind(new.kind.as_str())
                    .bind(patient_id)
                    .bind(new.jurisdiction_id)
                    .bind(&new.data)
                    .fetch_one(&mut *tx)
                    .await?
                }
                Write::Update {
                    kind,
                    id,
                    patient_id,
                    jurisdiction_id,
                    data,
                } => sqlx::query(&format!(
                    "UPDATE records
                     SET data = $1,
                         patient_id = COALESCE($2, patient_id),
                         jurisdiction_id = COALESCE($3, jurisdiction_id),
                         version = version + 1,
                         updated_at = NOW()
                     WHERE kind = $4 AND id = $5
                     RETURNING {COLUMNS}"
                ))
                .bind(&data)
                .bind(patient_id)
                .bind(jurisdiction_id)
                .bind(kind.as_str())
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound { kind, id })?,
            };
            applied.push(decode_row(row)?);
        }

        // Dropping `tx` on any early return above rolls the batch back.
        tx.commit().await?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_takes_wildcards_literally() {
        assert_eq!(like_pattern("Love"), "%love%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
