//! # Promotion Repository
//!
//! Promotion definitions, their targeting lists, and the usage ledger.
//!
//! ## Redemption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 One redemption, one savepoint                           │
//! │                                                                         │
//! │  SAVEPOINT                                                              │
//! │    UPDATE promotions SET usage_count = usage_count + 1                  │
//! │     WHERE id = ? AND is_active = 1                                      │
//! │       AND (usage_limit IS NULL OR usage_count < usage_limit)            │
//! │       AND (per_customer_limit IS NULL                                   │
//! │            OR per_customer_limit > <rows for this customer>)            │
//! │        │                                                                │
//! │        ├── 0 rows ──► read counters ──► UsageConflict                   │
//! │        ▼                                                                │
//! │    INSERT INTO promotion_usages (...)                                   │
//! │  RELEASE                                                                │
//! │                                                                         │
//! │  Both statements run on the caller's order transaction. If the order    │
//! │  rolls back, the increment and the ledger row roll back with it.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `usage_count` is never written by `update`; only redemption moves it.

use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{
    generate_id, parse_decimal, parse_optional_decimal, to_optional_u32, to_u32,
};
use pharos_core::promotions::Redemption;
use pharos_core::validation::{normalize_code, validate_promotion};
use pharos_core::{
    CustomerTier, CustomerType, Promotion, PromotionKind, PromotionRejection, PromotionSnapshot,
    PromotionTarget, PromotionUsage, UsageConflict, ValidityWindow,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct PromotionRow {
    id: String,
    code: String,
    name: String,
    kind: PromotionKind,
    value: String,
    buy_quantity: Option<i64>,
    get_quantity: Option<i64>,
    bundle_size: Option<i64>,
    min_order_amount: Option<String>,
    max_discount: Option<String>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    usage_limit: Option<i64>,
    per_customer_limit: Option<i64>,
    usage_count: i64,
    target_customer_tier: Option<CustomerTier>,
    target_customer_type: Option<CustomerType>,
    stacks_with_promotions: bool,
    stacks_with_rules: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl PromotionRow {
    fn into_promotion(
        self,
        product_ids: Vec<String>,
        customer_ids: Vec<String>,
    ) -> DbResult<Promotion> {
        Ok(Promotion {
            value: parse_decimal("promotions.value", &self.value)?,
            buy_quantity: to_optional_u32("promotions.buy_quantity", self.buy_quantity)?,
            get_quantity: to_optional_u32("promotions.get_quantity", self.get_quantity)?,
            bundle_size: to_optional_u32("promotions.bundle_size", self.bundle_size)?,
            min_order_amount: parse_optional_decimal(
                "promotions.min_order_amount",
                self.min_order_amount.as_deref(),
            )?,
            max_discount: parse_optional_decimal(
                "promotions.max_discount",
                self.max_discount.as_deref(),
            )?,
            usage_limit: to_optional_u32("promotions.usage_limit", self.usage_limit)?,
            per_customer_limit: to_optional_u32(
                "promotions.per_customer_limit",
                self.per_customer_limit,
            )?,
            usage_count: to_u32("promotions.usage_count", self.usage_count)?,
            id: self.id,
            code: self.code,
            name: self.name,
            kind: self.kind,
            window: ValidityWindow {
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            },
            target: PromotionTarget {
                product_ids,
                customer_ids,
                customer_tier: self.target_customer_tier,
                customer_type: self.target_customer_type,
            },
            stacks_with_promotions: self.stacks_with_promotions,
            stacks_with_rules: self.stacks_with_rules,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UsageRow {
    id: String,
    promotion_id: String,
    customer_id: String,
    order_id: String,
    discount_applied: String,
    used_at: DateTime<Utc>,
}

impl TryFrom<UsageRow> for PromotionUsage {
    type Error = DbError;

    fn try_from(row: UsageRow) -> DbResult<Self> {
        Ok(PromotionUsage {
            discount_applied: parse_decimal(
                "promotion_usages.discount_applied",
                &row.discount_applied,
            )?,
            id: row.id,
            promotion_id: row.promotion_id,
            customer_id: row.customer_id,
            order_id: row.order_id,
            used_at: row.used_at,
        })
    }
}

/// Live counters for one promotion and one customer, as the database sees them now.
#[derive(Debug, FromRow)]
struct UsageCounters {
    usage_limit: Option<i64>,
    per_customer_limit: Option<i64>,
    usage_count: i64,
    customer_count: i64,
    is_active: bool,
}

impl UsageCounters {
    /// The reason a redemption cannot happen right now, if any.
    fn blocking(&self) -> Option<UsageConflict> {
        if !self.is_active {
            Some(UsageConflict::Missing)
        } else if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) {
            Some(UsageConflict::TotalCapReached)
        } else if self
            .per_customer_limit
            .is_some_and(|limit| self.customer_count >= limit)
        {
            Some(UsageConflict::CustomerCapReached)
        } else {
            None
        }
    }
}

const SELECT_PROMOTION: &str = r#"
    SELECT id, code, name, kind, value, buy_quantity, get_quantity, bundle_size,
           min_order_amount, max_discount, valid_from, valid_to,
           usage_limit, per_customer_limit, usage_count,
           target_customer_tier, target_customer_type,
           stacks_with_promotions, stacks_with_rules, is_active, created_at
    FROM promotions
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for promotions and their usage ledger.
///
/// ## Usage
/// ```rust,ignore
/// let promotions = db.promotions();
/// promotions.insert(&flu_season).await?;
///
/// // Inside an order transaction
/// let mut tx = db.begin().await?;
/// let outcome = PromotionRepository::record_usage(&mut tx, &redemption).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    /// Creates a promotion with a zero usage counter.
    ///
    /// The definition and its targeting rows are written in one transaction.
    pub async fn insert(&self, promotion: &Promotion) -> DbResult<()> {
        validate_promotion(promotion)?;

        debug!(
            id = %promotion.id,
            code = %promotion.code,
            kind = ?promotion.kind,
            "Inserting promotion"
        );

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, code, name, kind, value, buy_quantity, get_quantity, bundle_size,
                min_order_amount, max_discount, valid_from, valid_to,
                usage_limit, per_customer_limit, usage_count,
                target_customer_tier, target_customer_type,
                stacks_with_promotions, stacks_with_rules, is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0,
                ?15, ?16, ?17, ?18, ?19, ?20, ?20
            )
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(promotion.kind)
        .bind(promotion.value.to_string())
        .bind(promotion.buy_quantity.map(i64::from))
        .bind(promotion.get_quantity.map(i64::from))
        .bind(promotion.bundle_size.map(i64::from))
        .bind(promotion.min_order_amount.map(|d| d.to_string()))
        .bind(promotion.max_discount.map(|d| d.to_string()))
        .bind(promotion.window.valid_from)
        .bind(promotion.window.valid_to)
        .bind(promotion.usage_limit.map(i64::from))
        .bind(promotion.per_customer_limit.map(i64::from))
        .bind(promotion.target.customer_tier)
        .bind(promotion.target.customer_type)
        .bind(promotion.stacks_with_promotions)
        .bind(promotion.stacks_with_rules)
        .bind(promotion.is_active)
        .bind(promotion.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| match DbError::from(err) {
            DbError::UniqueViolation { field, .. } if field.contains("code") => {
                DbError::duplicate("promotion code", &promotion.code)
            }
            other => other,
        })?;

        write_targets(&mut tx, promotion).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Replaces the definition and targeting of a promotion.
    ///
    /// The usage counter is left alone; lowering `usage_limit` below it is
    /// refused by the schema.
    pub async fn update(&self, promotion: &Promotion) -> DbResult<()> {
        validate_promotion(promotion)?;

        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let result = sqlx::query(
            r#"
            UPDATE promotions SET
                code = ?2,
                name = ?3,
                kind = ?4,
                value = ?5,
                buy_quantity = ?6,
                get_quantity = ?7,
                bundle_size = ?8,
                min_order_amount = ?9,
                max_discount = ?10,
                valid_from = ?11,
                valid_to = ?12,
                usage_limit = ?13,
                per_customer_limit = ?14,
                target_customer_tier = ?15,
                target_customer_type = ?16,
                stacks_with_promotions = ?17,
                stacks_with_rules = ?18,
                is_active = ?19,
                updated_at = ?20
            WHERE id = ?1
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.code)
        .bind(&promotion.name)
        .bind(promotion.kind)
        .bind(promotion.value.to_string())
        .bind(promotion.buy_quantity.map(i64::from))
        .bind(promotion.get_quantity.map(i64::from))
        .bind(promotion.bundle_size.map(i64::from))
        .bind(promotion.min_order_amount.map(|d| d.to_string()))
        .bind(promotion.max_discount.map(|d| d.to_string()))
        .bind(promotion.window.valid_from)
        .bind(promotion.window.valid_to)
        .bind(promotion.usage_limit.map(i64::from))
        .bind(promotion.per_customer_limit.map(i64::from))
        .bind(promotion.target.customer_tier)
        .bind(promotion.target.customer_type)
        .bind(promotion.stacks_with_promotions)
        .bind(promotion.stacks_with_rules)
        .bind(promotion.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", &promotion.id));
        }

        sqlx::query("DELETE FROM promotion_products WHERE promotion_id = ?1")
            .bind(&promotion.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM promotion_customers WHERE promotion_id = ?1")
            .bind(&promotion.id)
            .execute(&mut *tx)
            .await?;
        write_targets(&mut tx, promotion).await?;

        tx.commit().await?;

        debug!(id = %promotion.id, "Promotion updated");
        Ok(())
    }

    /// Soft-deletes a promotion. Its ledger rows stay.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE promotions SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id));
        }

        debug!(id = %id, "Promotion deactivated");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Promotion>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<PromotionRow> = sqlx::query_as(&format!("{SELECT_PROMOTION} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Some(load_targets(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Looks a promotion up by code, ignoring case and surrounding blanks.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Promotion>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<PromotionRow> =
            sqlx::query_as(&format!("{SELECT_PROMOTION} WHERE code = ?1"))
                .bind(normalize_code(code))
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some(row) => Ok(Some(load_targets(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Snapshot Fetch
    // -------------------------------------------------------------------------

    /// Enabled promotions for the requested codes, each with the customer's
    /// usage count.
    ///
    /// Only the `is_active` flag is filtered here. The validity window is
    /// left to the ledger so an out-of-window code is reported as `Expired`
    /// or `NotYetActive` instead of `NotFound`.
    pub async fn active_snapshot(
        conn: &mut SqliteConnection,
        codes: &[String],
        customer_id: &str,
    ) -> DbResult<Vec<PromotionSnapshot>> {
        let mut snapshots = Vec::with_capacity(codes.len());

        for code in codes {
            let row: Option<PromotionRow> = sqlx::query_as(&format!(
                "{SELECT_PROMOTION} WHERE code = ?1 AND is_active = 1"
            ))
            .bind(normalize_code(code))
            .fetch_optional(&mut *conn)
            .await?;

            let Some(row) = row else {
                continue;
            };
            if snapshots
                .iter()
                .any(|s: &PromotionSnapshot| s.promotion.id == row.id)
            {
                continue;
            }

            let promotion = load_targets(conn, row).await?;
            let customer_usage_count =
                Self::customer_usage_count(conn, &promotion.id, customer_id).await?;
            snapshots.push(PromotionSnapshot {
                promotion,
                customer_usage_count,
            });
        }

        debug!(requested = codes.len(), found = snapshots.len(), "Fetched promotion snapshot");
        Ok(snapshots)
    }

    // -------------------------------------------------------------------------
    // Usage Ledger
    // -------------------------------------------------------------------------

    /// One conditional increment plus its ledger row.
    ///
    /// ## Returns
    /// * `Ok(Ok(usage))` - Slot taken, row written
    /// * `Ok(Err(conflict))` - Cap reached or promotion gone; nothing written
    /// * `Err(DbError)` - Storage failure
    pub async fn try_record(
        conn: &mut SqliteConnection,
        redemption: &Redemption<'_>,
    ) -> DbResult<Result<PromotionUsage, UsageConflict>> {
        let promotion = redemption.promotion;
        let mut savepoint = conn.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE promotions
            SET usage_count = usage_count + 1
            WHERE id = ?1
              AND is_active = 1
              AND (usage_limit IS NULL OR usage_count < usage_limit)
              AND (per_customer_limit IS NULL OR per_customer_limit > (
                    SELECT COUNT(*) FROM promotion_usages
                    WHERE promotion_id = ?1 AND customer_id = ?2
              ))
            "#,
        )
        .bind(&promotion.id)
        .bind(redemption.customer_id)
        .execute(&mut *savepoint)
        .await?;

        if updated.rows_affected() == 0 {
            let counters =
                read_counters(&mut savepoint, &promotion.id, redemption.customer_id).await?;
            savepoint.rollback().await?;

            let conflict = match counters {
                None => UsageConflict::Missing,
                Some(counters) => counters.blocking().unwrap_or(UsageConflict::TotalCapReached),
            };
            return Ok(Err(conflict));
        }

        let usage = PromotionUsage {
            id: generate_id(),
            promotion_id: promotion.id.clone(),
            customer_id: redemption.customer_id.to_string(),
            order_id: redemption.order_id.to_string(),
            discount_applied: redemption.discount_applied,
            used_at: redemption.used_at,
        };

        sqlx::query(
            r#"
            INSERT INTO promotion_usages (
                id, promotion_id, customer_id, order_id, discount_applied, used_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&usage.id)
        .bind(&usage.promotion_id)
        .bind(&usage.customer_id)
        .bind(&usage.order_id)
        .bind(usage.discount_applied.to_string())
        .bind(usage.used_at)
        .execute(&mut *savepoint)
        .await?;

        savepoint.commit().await?;

        debug!(
            code = %promotion.code,
            order_id = %usage.order_id,
            usage_id = %usage.id,
            "Promotion usage recorded"
        );
        Ok(Ok(usage))
    }

    /// Records a redemption, re-reading the counters and retrying once when
    /// the first increment does not land.
    pub async fn record_usage(
        conn: &mut SqliteConnection,
        redemption: &Redemption<'_>,
    ) -> DbResult<Result<PromotionUsage, PromotionRejection>> {
        let promotion = redemption.promotion;

        let first = match Self::try_record(conn, redemption).await? {
            Ok(usage) => return Ok(Ok(usage)),
            Err(conflict) => conflict,
        };

        debug!(
            code = %promotion.code,
            order_id = %redemption.order_id,
            conflict = %first,
            "Promotion usage conflict, re-checking counter"
        );

        let has_capacity = read_counters(conn, &promotion.id, redemption.customer_id)
            .await?
            .is_some_and(|counters| counters.blocking().is_none());
        if !has_capacity {
            return Ok(Err(first.into()));
        }

        match Self::try_record(conn, redemption).await? {
            Ok(usage) => Ok(Ok(usage)),
            Err(second) => {
                warn!(
                    code = %promotion.code,
                    order_id = %redemption.order_id,
                    conflict = %second,
                    "Promotion usage retry failed"
                );
                Ok(Err(second.into()))
            }
        }
    }

    /// Ledger rows for one customer and one promotion.
    pub async fn customer_usage_count(
        conn: &mut SqliteConnection,
        promotion_id: &str,
        customer_id: &str,
    ) -> DbResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promotion_usages WHERE promotion_id = ?1 AND customer_id = ?2",
        )
        .bind(promotion_id)
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;

        to_u32("promotion_usages.count", count)
    }

    /// Every ledger row of a promotion, oldest first.
    pub async fn usages_for(&self, promotion_id: &str) -> DbResult<Vec<PromotionUsage>> {
        let rows: Vec<UsageRow> = sqlx::query_as(
            r#"
            SELECT id, promotion_id, customer_id, order_id, discount_applied, used_at
            FROM promotion_usages
            WHERE promotion_id = ?1
            ORDER BY used_at, id
            "#,
        )
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PromotionUsage::try_from).collect()
    }

    /// Whether the stored counter equals the number of ledger rows.
    pub async fn is_consistent(&self, promotion_id: &str) -> DbResult<bool> {
        let counts: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT p.usage_count,
                   (SELECT COUNT(*) FROM promotion_usages u WHERE u.promotion_id = p.id)
            FROM promotions p
            WHERE p.id = ?1
            "#,
        )
        .bind(promotion_id)
        .fetch_optional(&self.pool)
        .await?;

        let (counter, rows) = counts.ok_or_else(|| DbError::not_found("Promotion", promotion_id))?;
        if counter != rows {
            warn!(promotion_id = %promotion_id, counter, rows, "Promotion usage counter drifted");
        }
        Ok(counter == rows)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn write_targets(conn: &mut SqliteConnection, promotion: &Promotion) -> DbResult<()> {
    for product_id in &promotion.target.product_ids {
        sqlx::query("INSERT INTO promotion_products (promotion_id, product_id) VALUES (?1, ?2)")
            .bind(&promotion.id)
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
    }
    for customer_id in &promotion.target.customer_ids {
        sqlx::query("INSERT INTO promotion_customers (promotion_id, customer_id) VALUES (?1, ?2)")
            .bind(&promotion.id)
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn load_targets(conn: &mut SqliteConnection, row: PromotionRow) -> DbResult<Promotion> {
    let product_ids: Vec<String> = sqlx::query_scalar(
        "SELECT product_id FROM promotion_products WHERE promotion_id = ?1 ORDER BY product_id",
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let customer_ids: Vec<String> = sqlx::query_scalar(
        "SELECT customer_id FROM promotion_customers WHERE promotion_id = ?1 ORDER BY customer_id",
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    row.into_promotion(product_ids, customer_ids)
}

async fn read_counters(
    conn: &mut SqliteConnection,
    promotion_id: &str,
    customer_id: &str,
) -> DbResult<Option<UsageCounters>> {
    let counters: Option<UsageCounters> = sqlx::query_as(
        r#"
        SELECT usage_limit, per_customer_limit, usage_count, is_active,
               (SELECT COUNT(*) FROM promotion_usages
                WHERE promotion_id = ?1 AND customer_id = ?2) AS customer_count
        FROM promotions
        WHERE id = ?1
        "#,
    )
    .bind(promotion_id)
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(counters)
}
