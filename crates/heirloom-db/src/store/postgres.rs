use super::{Page, QueryOptions, Record, RecordStore, SortOrder, StoreResult, WriteCondition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heirloom_core::{Address, AddressPrefix};
use sqlx::{FromRow, PgPool, Postgres};

#[derive(FromRow)]
struct RecordRow {
    pk: String,
    sk: String,
    data: serde_json::Value,
    revision: i64,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            address: Address::new(row.pk, row.sk),
            data: row.data,
            revision: row.revision,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL record store over the single `records` table.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[tracing::instrument(skip(self), fields(db.table = "records", db.operation = "select", db.pk = %address.pk, db.sk = %address.sk))]
    async fn get(&self, address: &Address) -> StoreResult<Option<Record>> {
        let row = sqlx::query_as::<Postgres, RecordRow>(
            "SELECT pk, sk, data, revision, updated_at FROM records WHERE pk = $1 AND sk = $2",
        )
        .bind(&address.pk)
        .bind(&address.sk)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Record::from))
    }

    #[tracing::instrument(skip(self, data), fields(db.table = "records", db.operation = "upsert", db.pk = %address.pk, db.sk = %address.sk))]
    async fn put(&self, address: &Address, data: serde_json::Value) -> StoreResult<Record> {
        let row = sqlx::query_as::<Postgres, RecordRow>(
            r#"
            INSERT INTO records (pk, sk, data, revision, updated_at)
            VALUES ($1, $2, $3, 1, NOW())
            ON CONFLICT (pk, sk) DO UPDATE
            SET data = EXCLUDED.data, revision = records.revision + 1, updated_at = NOW()
            RETURNING pk, sk, data, revision, updated_at
            "#,
        )
        .bind(&address.pk)
        .bind(&address.sk)
        .bind(&data)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[tracing::instrument(skip(self, data), fields(db.table = "records", db.operation = "conditional_write", db.pk = %address.pk, db.sk = %address.sk))]
    async fn put_if(
        &self,
        address: &Address,
        data: serde_json::Value,
        condition: WriteCondition,
    ) -> StoreResult<Option<Record>> {
        let row = match condition {
            WriteCondition::NotExists => {
                sqlx::query_as::<Postgres, RecordRow>(
                    r#"
                    INSERT INTO records (pk, sk, data, revision, updated_at)
                    VALUES ($1, $2, $3, 1, NOW())
                    ON CONFLICT (pk, sk) DO NOTHING
                    RETURNING pk, sk, data, revision, updated_at
                    "#,
                )
                .bind(&address.pk)
                .bind(&address.sk)
                .bind(&data)
                .fetch_optional(&self.pool)
                .await?
            }
            WriteCondition::RevisionEquals(revision) => {
                sqlx::query_as::<Postgres, RecordRow>(
                    r#"
                    UPDATE records
                    SET data = $3, revision = revision + 1, updated_at = NOW()
                    WHERE pk = $1 AND sk = $2 AND revision = $4
                    RETURNING pk, sk, data, revision, updated_at
                    "#,
                )
                .bind(&address.pk)
                .bind(&address.sk)
                .bind(&data)
                .bind(revision)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        if row.is_none() {
            tracing::debug!(condition = ?condition, "Conditional write rejected");
        }

        Ok(row.map(Record::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "records", db.operation = "delete", db.pk = %address.pk, db.sk = %address.sk))]
    async fn delete(&self, address: &Address) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE pk = $1 AND sk = $2")
            .bind(&address.pk)
            .bind(&address.sk)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "records", db.operation = "conditional_delete", db.pk = %address.pk, db.sk = %address.sk))]
    async fn delete_if(&self, address: &Address, revision: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM records WHERE pk = $1 AND sk = $2 AND revision = $3")
                .bind(&address.pk)
                .bind(&address.sk)
                .bind(revision)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, options), fields(db.table = "records", db.operation = "select", db.pk = %prefix.pk, db.sk_prefix = %prefix.sk_prefix))]
    async fn query(&self, prefix: &AddressPrefix, options: QueryOptions) -> StoreResult<Page> {
        let cursor_sk = options.cursor_sk(prefix)?.map(str::to_string);
        let limit = options.effective_limit();

        let sql = match options.order {
            SortOrder::Ascending => {
                r#"
                SELECT pk, sk, data, revision, updated_at
                FROM records
                WHERE pk = $1 AND starts_with(sk, $2) AND ($3::text IS NULL OR sk > $3)
                ORDER BY sk ASC
                LIMIT $4
                "#
            }
            SortOrder::Descending => {
                r#"
                SELECT pk, sk, data, revision, updated_at
                FROM records
                WHERE pk = $1 AND starts_with(sk, $2) AND ($3::text IS NULL OR sk < $3)
                ORDER BY sk DESC
                LIMIT $4
                "#
            }
        };

        let rows = sqlx::query_as::<Postgres, RecordRow>(sql)
            .bind(&prefix.pk)
            .bind(&prefix.sk_prefix)
            .bind(cursor_sk)
            .bind((limit + 1) as i64)
            .fetch_all(&self.pool)
            .await?;

        let records = rows.into_iter().map(Record::from).collect();
        Ok(Page::from_overfetch(records, limit))
    }
}
