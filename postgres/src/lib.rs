//! `PostgreSQL` listing store for the listings catalog.
//!
//! [`PostgresListingStore`] implements the `ListingStore` trait from
//! `listings-core`. Each listing is one JSONB document in a table keyed by id:
//!
//! ```sql
//! CREATE TABLE listings (
//!     id TEXT PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! Searches translate each predicate into a case-insensitive `ILIKE` on the
//! predicate's JSON path. Pages are ordered by the requested path (numerically
//! for `productionYear` and `mileage`) and then by id, so pagination is stable.
//!
//! # Example
//!
//! ```ignore
//! use listings_postgres::PostgresListingStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresListingStore::connect("postgres://localhost/listings", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use listings_core::listing::{Listing, ListingField};
use listings_core::query::{Filter, Page, PageRequest, SearchQuery};
use listings_core::store::{ListingStore, StoreError, StoreFuture};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Table created by the bundled migrations.
pub const DEFAULT_TABLE: &str = "listings";

/// Listing store backed by a `PostgreSQL` JSONB table.
#[derive(Clone)]
pub struct PostgresListingStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresListingStore {
    /// Create a store on the default `listings` table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table_name: DEFAULT_TABLE.to_string(),
        }
    }

    /// Create a store on another table with the same layout.
    ///
    /// The bundled migrations only create `listings`; other tables must
    /// already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if `table_name` is not a plain
    /// (optionally schema-qualified) SQL identifier.
    pub fn with_table(pool: PgPool, table_name: impl Into<String>) -> Result<Self, StoreError> {
        let table_name = table_name.into();
        if !is_valid_table_name(&table_name) {
            return Err(StoreError::Query(format!("Invalid table name: {table_name}")));
        }
        Ok(Self { pool, table_name })
    }

    /// Connect a new pool and create a store on the default table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the table name of this store.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn page(&self, filter: &Filter, request: &PageRequest) -> Result<Page<Listing>, StoreError> {
        let total: i64 = count_query(&self.table_name, filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        let rows: Vec<(Json<Listing>,)> = page_query(&self.table_name, filter, request)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        let content = rows.into_iter().map(|(Json(listing),)| listing).collect::<Vec<_>>();
        tracing::debug!(
            table = %self.table_name,
            filter = %filter.explain(),
            returned = content.len(),
            total,
            "Listing page loaded"
        );

        Ok(Page::new(content, u64::try_from(total).unwrap_or(0)))
    }
}

impl ListingStore for PostgresListingStore {
    fn exists_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", self.table_name);
            sqlx::query_scalar::<_, bool>(&query)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error)
        })
    }

    fn find_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Listing>> {
        Box::pin(async move {
            let query = format!("SELECT data FROM {} WHERE id = $1", self.table_name);
            let row: Option<(Json<Listing>,)> = sqlx::query_as(&query)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;

            Ok(row.map(|(Json(listing),)| listing))
        })
    }

    fn save(&self, mut listing: Listing) -> StoreFuture<'_, Listing> {
        Box::pin(async move {
            let id = listing
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            listing.id = Some(id.clone());

            let query = format!(
                "INSERT INTO {} (id, data, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (id) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
                self.table_name
            );
            sqlx::query(&query)
                .bind(&id)
                .bind(Json(&listing))
                .execute(&self.pool)
                .await
                .map_err(store_error)?;

            tracing::debug!(table = %self.table_name, id = %id, "Listing saved");
            Ok(listing)
        })
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let query = format!("DELETE FROM {} WHERE id = $1", self.table_name);
            sqlx::query(&query)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;

            tracing::debug!(table = %self.table_name, id = %id, "Listing deleted");
            Ok(())
        })
    }

    fn find_all(&self, page_request: PageRequest) -> StoreFuture<'_, Page<Listing>> {
        Box::pin(async move { self.page(&Filter::match_all(), &page_request).await })
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> StoreFuture<'a, Page<Listing>> {
        Box::pin(async move { self.page(&query.filter, &query.page_request).await })
    }
}

fn store_error(error: sqlx::Error) -> StoreError {
    if matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    ) {
        StoreError::Unavailable(error.to_string())
    } else if matches!(error, sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. }) {
        StoreError::Serialization(error.to_string())
    } else {
        StoreError::Query(error.to_string())
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Text value at a field's JSON path, e.g. `(data #>> '{contactInfo,email}')`.
fn json_text(field: ListingField) -> String {
    format!("(data #>> '{{{}}}')", field.segments().join(","))
}

/// `ORDER BY` expression for a field.
fn sort_expression(field: ListingField) -> String {
    if field.is_numeric() {
        format!("{}::bigint", json_text(field))
    } else {
        // Byte order, matching the in-process comparison
        format!("{} COLLATE \"C\"", json_text(field))
    }
}

/// `ILIKE` pattern matching `value` anywhere, with wildcards escaped.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (i, predicate) in filter.predicates().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        builder.push(json_text(predicate.field));
        builder.push(" ILIKE ");
        builder.push_bind(like_pattern(&predicate.value));
        builder.push(" ESCAPE '\\'");
    }
}

fn count_query<'a>(table: &str, filter: &Filter) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
    push_filter(&mut builder, filter);
    builder
}

fn page_query<'a>(table: &str, filter: &Filter, request: &PageRequest) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT data FROM {table}"));
    push_filter(&mut builder, filter);
    builder.push(format!(
        " ORDER BY {} {}, id COLLATE \"C\" ASC",
        sort_expression(request.sort),
        request.direction.as_sql()
    ));
    builder.push(" LIMIT ");
    builder.push_bind(i64::from(request.size));
    builder.push(" OFFSET ");
    builder.push_bind(i64::try_from(request.offset()).unwrap_or(i64::MAX));
    builder
}
