//! # Discount Rule Repository
//!
//! Administration of scoped discount rules and the candidate fetch.
//!
//! The fetch narrows by product target and validity only. Customer
//! constraints and quantity bounds are evaluated by the RuleMatcher, which
//! also needs the full candidate list to report ambiguous ties.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{parse_decimal, to_optional_u32};
use pharos_core::rules::QuantityRange;
use pharos_core::validation::validate_rule;
use pharos_core::{
    CustomerTier, CustomerType, DiscountKind, DiscountRule, Product, RuleScope, ValidityWindow,
};

#[derive(Debug, FromRow)]
struct RuleRow {
    id: String,
    name: String,
    scope: RuleScope,
    target_id: Option<String>,
    customer_tier: Option<CustomerTier>,
    customer_type: Option<CustomerType>,
    customer_id: Option<String>,
    kind: DiscountKind,
    value: String,
    min_quantity: Option<i64>,
    max_quantity: Option<i64>,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    priority: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for DiscountRule {
    type Error = DbError;

    fn try_from(row: RuleRow) -> DbResult<Self> {
        Ok(DiscountRule {
            value: parse_decimal("discount_rules.value", &row.value)?,
            quantity: QuantityRange {
                min_quantity: to_optional_u32("discount_rules.min_quantity", row.min_quantity)?,
                max_quantity: to_optional_u32("discount_rules.max_quantity", row.max_quantity)?,
            },
            id: row.id,
            name: row.name,
            scope: row.scope,
            target_id: row.target_id,
            customer_tier: row.customer_tier,
            customer_type: row.customer_type,
            customer_id: row.customer_id,
            kind: row.kind,
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

const SELECT_RULE: &str = r#"
    SELECT id, name, scope, target_id, customer_tier, customer_type, customer_id,
           kind, value, min_quantity, max_quantity, valid_from, valid_to,
           priority, is_active, created_at
    FROM discount_rules
"#;

/// Repository for discount rules.
///
/// ## Usage
/// ```rust,ignore
/// let rules = db.rules();
/// rules.insert(&hospital_ten_percent).await?;
/// rules.deactivate(&hospital_ten_percent.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RuleRepository { pool }
    }

    /// Creates a rule after validating scope, value and ranges.
    pub async fn insert(&self, rule: &DiscountRule) -> DbResult<()> {
        validate_rule(rule)?;

        debug!(id = %rule.id, scope = ?rule.scope, kind = ?rule.kind, "Inserting discount rule");

        sqlx::query(
            r#"
            INSERT INTO discount_rules (
                id, name, scope, target_id, customer_tier, customer_type, customer_id,
                kind, value, min_quantity, max_quantity, valid_from, valid_to,
                priority, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.scope)
        .bind(&rule.target_id)
        .bind(rule.customer_tier)
        .bind(rule.customer_type)
        .bind(&rule.customer_id)
        .bind(rule.kind)
        .bind(rule.value.to_string())
        .bind(rule.quantity.min_quantity.map(i64::from))
        .bind(rule.quantity.max_quantity.map(i64::from))
        .bind(rule.window.valid_from)
        .bind(rule.window.valid_to)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces every editable field of a rule.
    pub async fn update(&self, rule: &DiscountRule) -> DbResult<()> {
        validate_rule(rule)?;

        let result = sqlx::query(
            r#"
            UPDATE discount_rules SET
                name = ?2,
                scope = ?3,
                target_id = ?4,
                customer_tier = ?5,
                customer_type = ?6,
                customer_id = ?7,
                kind = ?8,
                value = ?9,
                min_quantity = ?10,
                max_quantity = ?11,
                valid_from = ?12,
                valid_to = ?13,
                priority = ?14,
                is_active = ?15,
                updated_at = ?16
            WHERE id = ?1
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.scope)
        .bind(&rule.target_id)
        .bind(rule.customer_tier)
        .bind(rule.customer_type)
        .bind(&rule.customer_id)
        .bind(rule.kind)
        .bind(rule.value.to_string())
        .bind(rule.quantity.min_quantity.map(i64::from))
        .bind(rule.quantity.max_quantity.map(i64::from))
        .bind(rule.window.valid_from)
        .bind(rule.window.valid_to)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DiscountRule", &rule.id));
        }
        Ok(())
    }

    /// Soft-deletes a rule.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE discount_rules SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DiscountRule", id));
        }

        debug!(id = %id, "Discount rule deactivated");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<DiscountRule>> {
        let row: Option<RuleRow> = sqlx::query_as(&format!("{SELECT_RULE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DiscountRule::try_from).transpose()
    }

    /// Active rules that could target `product` at `as_of`.
    ///
    /// ```text
    /// scope = 'global'
    /// OR (scope = 'product'      AND target_id = product.id)
    /// OR (scope = 'category'     AND target_id = product.category_id)
    /// OR (scope = 'manufacturer' AND target_id = product.manufacturer_id)
    /// ```
    pub async fn active_for_product(
        conn: &mut SqliteConnection,
        product: &Product,
        as_of: DateTime<Utc>,
    ) -> DbResult<Vec<DiscountRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            r#"{SELECT_RULE}
            WHERE is_active = 1
              AND (valid_from IS NULL OR valid_from <= ?1)
              AND (valid_to IS NULL OR valid_to >= ?1)
              AND (
                    scope = 'global'
                 OR (scope = 'product' AND target_id = ?2)
                 OR (scope = 'category' AND target_id = ?3)
                 OR (scope = 'manufacturer' AND target_id = ?4)
              )
            "#
        ))
        .bind(as_of)
        .bind(&product.id)
        .bind(&product.category_id)
        .bind(&product.manufacturer_id)
        .fetch_all(&mut *conn)
        .await?;

        debug!(product_id = %product.id, count = rows.len(), "Fetched candidate rules");
        rows.into_iter().map(DiscountRule::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    fn product() -> Product {
        Product {
            id: "prod-1".to_string(),
            name: "Insulin pen".to_string(),
            unit_price: dec!(40.00),
            tax_rate_bps: 0,
            category_id: "cat-diabetes".to_string(),
            manufacturer_id: "mfr-nordic".to_string(),
            is_active: true,
        }
    }

    fn rule(id: &str, scope: RuleScope, target: Option<&str>) -> DiscountRule {
        DiscountRule {
            id: id.to_string(),
            name: format!("rule {id}"),
            scope,
            target_id: target.map(str::to_string),
            customer_tier: Some(CustomerTier::Premium),
            customer_type: None,
            customer_id: None,
            kind: DiscountKind::Percentage,
            value: dec!(12.5),
            quantity: QuantityRange {
                min_quantity: Some(10),
                max_quantity: None,
            },
            window: ValidityWindow::always(),
            priority: 3,
            is_active: true,
            created_at: at(1),
        }
    }

    #[tokio::test]
    async fn test_active_for_product_narrows_by_target() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.rules();

        repo.insert(&rule("r-global", RuleScope::Global, None)).await.unwrap();
        repo.insert(&rule("r-cat", RuleScope::Category, Some("cat-diabetes")))
            .await
            .unwrap();
        repo.insert(&rule("r-mfr", RuleScope::Manufacturer, Some("mfr-nordic")))
            .await
            .unwrap();
        repo.insert(&rule("r-other", RuleScope::Product, Some("prod-2")))
            .await
            .unwrap();
        repo.insert(&rule("r-off", RuleScope::Product, Some("prod-1")))
            .await
            .unwrap();
        repo.deactivate("r-off").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let mut ids: Vec<String> = RuleRepository::active_for_product(&mut conn, &product(), at(5))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["r-cat", "r-global", "r-mfr"]);
    }

    #[tokio::test]
    async fn test_rule_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let original = rule("r-1", RuleScope::Category, Some("cat-diabetes"));
        db.rules().insert(&original).await.unwrap();

        let loaded = db.rules().get("r-1").await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_scoped_rule_without_target_is_refused() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .rules()
            .insert(&rule("r-bad", RuleScope::Product, None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Invalid(_)));
    }
}
