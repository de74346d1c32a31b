//! # Price Override Repository
//!
//! Administration of contract prices and the active-candidate fetch used by
//! the pricing service.
//!
//! ## Fetch Filter
//! ```text
//! price_overrides
//!   WHERE product_id = ?
//!     AND is_active = 1
//!     AND (valid_from IS NULL OR valid_from <= as_of)
//!     AND (valid_to   IS NULL OR valid_to   >= as_of)
//!        │
//!        ▼
//! PriceOverrideStore picks the most specific, then priority, then newest
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::parse_decimal;
use pharos_core::validation::validate_override;
use pharos_core::{PriceCategory, PriceOverride, ValidityWindow};

#[derive(Debug, FromRow)]
struct OverrideRow {
    id: String,
    product_id: String,
    region_id: Option<String>,
    customer_id: Option<String>,
    price_category: PriceCategory,
    unit_price: String,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    priority: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for PriceOverride {
    type Error = DbError;

    fn try_from(row: OverrideRow) -> DbResult<Self> {
        Ok(PriceOverride {
            unit_price: parse_decimal("price_overrides.unit_price", &row.unit_price)?,
            id: row.id,
            product_id: row.product_id,
            region_id: row.region_id,
            customer_id: row.customer_id,
            price_category: row.price_category,
            window: ValidityWindow {
                valid_from: row.valid_from,
                valid_to: row.valid_to,
            },
            priority: row.priority,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

const SELECT_OVERRIDE: &str = r#"
    SELECT id, product_id, region_id, customer_id, price_category, unit_price,
           valid_from, valid_to, priority, is_active, created_at
    FROM price_overrides
"#;

/// Repository for price overrides.
#[derive(Debug, Clone)]
pub struct OverrideRepository {
    pool: SqlitePool,
}

impl OverrideRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OverrideRepository { pool }
    }

    /// Creates an override.
    ///
    /// ## Example
    /// ```rust,ignore
    /// db.overrides().insert(&PriceOverride {
    ///     id: generate_id(),
    ///     product_id: "prod-amox-500".into(),
    ///     customer_id: Some("cust-stmary".into()),
    ///     unit_price: dec!(9.80),
    ///     ..
    /// }).await?;
    /// ```
    pub async fn insert(&self, ovr: &PriceOverride) -> DbResult<()> {
        validate_override(ovr)?;

        debug!(
            id = %ovr.id,
            product_id = %ovr.product_id,
            specificity = ?ovr.specificity(),
            "Inserting price override"
        );

        sqlx::query(
            r#"
            INSERT INTO price_overrides (
                id, product_id, region_id, customer_id, price_category, unit_price,
                valid_from, valid_to, priority, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
        )
        .bind(&ovr.id)
        .bind(&ovr.product_id)
        .bind(&ovr.region_id)
        .bind(&ovr.customer_id)
        .bind(ovr.price_category)
        .bind(ovr.unit_price.to_string())
        .bind(ovr.window.valid_from)
        .bind(ovr.window.valid_to)
        .bind(ovr.priority)
        .bind(ovr.is_active)
        .bind(ovr.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the editable fields of an override. The product binding is fixed.
    pub async fn update(&self, ovr: &PriceOverride) -> DbResult<()> {
        validate_override(ovr)?;

        let result = sqlx::query(
            r#"
            UPDATE price_overrides SET
                region_id = ?2,
                customer_id = ?3,
                price_category = ?4,
                unit_price = ?5,
                valid_from = ?6,
                valid_to = ?7,
                priority = ?8,
                is_active = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&ovr.id)
        .bind(&ovr.region_id)
        .bind(&ovr.customer_id)
        .bind(ovr.price_category)
        .bind(ovr.unit_price.to_string())
        .bind(ovr.window.valid_from)
        .bind(ovr.window.valid_to)
        .bind(ovr.priority)
        .bind(ovr.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PriceOverride", &ovr.id));
        }
        Ok(())
    }

    /// Soft-deletes an override. Historical audit records keep its ID.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE price_overrides SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PriceOverride", id));
        }

        debug!(id = %id, "Price override deactivated");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<PriceOverride>> {
        let row: Option<OverrideRow> = sqlx::query_as(&format!("{SELECT_OVERRIDE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PriceOverride::try_from).transpose()
    }

    /// Active overrides for `product_id` whose window contains `as_of`.
    pub async fn active_for_product(
        conn: &mut SqliteConnection,
        product_id: &str,
        as_of: DateTime<Utc>,
    ) -> DbResult<Vec<PriceOverride>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(&format!(
            r#"{SELECT_OVERRIDE}
            WHERE product_id = ?1
              AND is_active = 1
              AND (valid_from IS NULL OR valid_from <= ?2)
              AND (valid_to IS NULL OR valid_to >= ?2)
            "#
        ))
        .bind(product_id)
        .bind(as_of)
        .fetch_all(&mut *conn)
        .await?;

        debug!(product_id = %product_id, count = rows.len(), "Fetched active overrides");
        rows.into_iter().map(PriceOverride::try_from).collect()
    }
}
