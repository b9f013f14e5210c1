//! Repository for the wide `data_table`.
//!
//! Rows are read as `to_jsonb(data_table)` so the 222 columns do not need a
//! hand-written struct. Writes only ever name columns that passed the
//! `TableSchema` allow-list; values are bound, never interpolated.

use gridsync_core::page::{Direction, Row, SortOrder};
use gridsync_core::schema::TypedValue;
use gridsync_core::types::RowId;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// A single column assignment for an UPDATE or INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnAssignment {
    /// Column name; must come from the schema allow-list.
    pub column: String,
    pub value: TypedValue,
}

impl ColumnAssignment {
    pub fn new(column: impl Into<String>, value: TypedValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// Outcome of [`DataRowRepo::update_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchUpdate {
    /// Every row was updated and the transaction committed.
    Applied(u64),
    /// This row does not exist; nothing was written.
    MissingRow(RowId),
}

/// Provides paging and column updates over `data_table`.
pub struct DataRowRepo;

impl DataRowRepo {
    /// Fetch up to `take` rows strictly after (forward) or before (backward)
    /// `cursor`, in walking order: ascending ids forward, descending
    /// backward.
    pub async fn fetch_page(
        pool: &PgPool,
        cursor: Option<RowId>,
        direction: Direction,
        take: i64,
    ) -> Result<Vec<Row>, sqlx::Error> {
        let query = match direction {
            Direction::Forward => {
                "SELECT to_jsonb(d) FROM data_table d \
                 WHERE ($1::bigint IS NULL OR d.id > $1) \
                 ORDER BY d.id ASC LIMIT $2"
            }
            Direction::Backward => {
                "SELECT to_jsonb(d) FROM data_table d \
                 WHERE ($1::bigint IS NULL OR d.id < $1) \
                 ORDER BY d.id DESC LIMIT $2"
            }
        };

        let values: Vec<serde_json::Value> = sqlx::query_scalar(query)
            .bind(cursor)
            .bind(take)
            .fetch_all(pool)
            .await?;

        values
            .into_iter()
            .map(|value| Row::from_json(value).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .collect()
    }

    /// Fetch one page by offset, ordered by `sort` with `id` as tie-breaker.
    pub async fn fetch_offset_page(
        pool: &PgPool,
        sort: &SortOrder,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Row>, sqlx::Error> {
        let direction = if sort.descending { "DESC" } else { "ASC" };
        let query = format!(
            "SELECT to_jsonb(d) FROM data_table d \
             ORDER BY d.{} {direction}, d.id ASC OFFSET $1 LIMIT $2",
            quote_ident(&sort.column)
        );

        let values: Vec<serde_json::Value> = sqlx::query_scalar(&query)
            .bind(offset)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        values
            .into_iter()
            .map(|value| Row::from_json(value).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .collect()
    }

    /// Total number of rows in the table.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM data_table")
            .fetch_one(pool)
            .await
    }

    /// Find a single row by id.
    pub async fn find_by_id(pool: &PgPool, id: RowId) -> Result<Option<Row>, sqlx::Error> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT to_jsonb(d) FROM data_table d WHERE d.id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        value
            .map(|v| Row::from_json(v).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()
    }

    /// Apply all `assignments` to one row in a single UPDATE statement.
    ///
    /// Returns the number of rows affected: `0` when the row does not exist.
    pub async fn update_columns(
        pool: &PgPool,
        id: RowId,
        assignments: &[ColumnAssignment],
    ) -> Result<u64, sqlx::Error> {
        if assignments.is_empty() {
            return Ok(0);
        }

        let result = update_query(id, assignments).build().execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Apply several row updates atomically.
    ///
    /// Rolls back and reports the first row id that matches nothing.
    /// Entries without assignments are skipped.
    pub async fn update_rows(
        pool: &PgPool,
        rows: &[(RowId, Vec<ColumnAssignment>)],
    ) -> Result<BatchUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut applied = 0;

        for (id, assignments) in rows {
            if assignments.is_empty() {
                continue;
            }
            let result = update_query(*id, assignments)
                .build()
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(BatchUpdate::MissingRow(*id));
            }
            applied += 1;
        }

        tx.commit().await?;
        Ok(BatchUpdate::Applied(applied))
    }

    /// Insert a row with the given column values and return its id.
    pub async fn insert(pool: &PgPool, assignments: &[ColumnAssignment]) -> Result<RowId, sqlx::Error> {
        if assignments.is_empty() {
            return sqlx::query_scalar("INSERT INTO data_table DEFAULT VALUES RETURNING id")
                .fetch_one(pool)
                .await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO data_table (");
        {
            let mut columns = builder.separated(", ");
            for assignment in assignments {
                columns.push(quote_ident(&assignment.column));
            }
        }
        builder.push(") VALUES (");
        {
            let mut values = builder.separated(", ");
            for assignment in assignments {
                push_typed_bind(&mut values, &assignment.value, true);
            }
        }
        builder.push(") RETURNING id");

        builder
            .build_query_scalar::<RowId>()
            .fetch_one(pool)
            .await
    }

    /// Delete a row. Returns the number of rows removed.
    pub async fn delete(pool: &PgPool, id: RowId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM data_table WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// `UPDATE data_table SET .. WHERE id = ..` for a non-empty assignment list.
fn update_query(id: RowId, assignments: &[ColumnAssignment]) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE data_table SET ");
    {
        let mut set = builder.separated(", ");
        for assignment in assignments {
            set.push(quote_ident(&assignment.column));
            set.push_unseparated(" = ");
            push_typed_bind(&mut set, &assignment.value, false);
        }
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder
}

/// Double-quote an identifier. Column names are allow-listed before they
/// get here; quoting keeps the statement well-formed regardless.
fn quote_ident(column: &str) -> String {
    format!("\"{}\"", column.replace('"', "\"\""))
}

/// Bind a typed value, either as a new list item (`as_item`) or glued to
/// the previous fragment (`col = $n`).
fn push_typed_bind<'qb, 'args>(
    separated: &mut sqlx::query_builder::Separated<'qb, 'args, Postgres, &'static str>,
    value: &TypedValue,
    as_item: bool,
) where
    'args: 'qb,
{
    match (value.clone(), as_item) {
        (TypedValue::Text(v), true) => separated.push_bind(v),
        (TypedValue::Text(v), false) => separated.push_bind_unseparated(v),
        (TypedValue::Float(v), true) => separated.push_bind(v),
        (TypedValue::Float(v), false) => separated.push_bind_unseparated(v),
        (TypedValue::Bool(v), true) => separated.push_bind(v),
        (TypedValue::Bool(v), false) => separated.push_bind_unseparated(v),
    };
}
