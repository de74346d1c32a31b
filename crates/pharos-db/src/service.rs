//! # Pricing Service
//!
//! The async boundary the order subsystem calls. It fetches one eager
//! snapshot, hands it to the pure [`PriceResolver`], and records promotion
//! usage on the caller's transaction.
//!
//! ## Order Line Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 price_order_line(tx, request, order_id)                 │
//! │                                                                         │
//! │  order tx ──► SAVEPOINT                                                 │
//! │                 │                                                       │
//! │                 ├── products / customers          (catalog)             │
//! │                 ├── price_overrides  active @ as_of                     │
//! │                 ├── discount_rules   active @ as_of                     │
//! │                 └── promotions       by code + customer usage           │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            PriceResolver::resolve  (pure, no awaits)                    │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            record_usage per applied promotion                           │
//! │                 │                                                       │
//! │         ┌───────┴────────┐                                              │
//! │      all ok          one rejected                                       │
//! │         │                │                                              │
//! │      RELEASE         ROLLBACK TO SAVEPOINT                              │
//! │         │                │                                              │
//! │   RedeemedLine     PricingError::Rejected                               │
//! │                                                                         │
//! │  The order tx is still the caller's: it commits or aborts the usage.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info};

use crate::error::{DbError, ServiceResult};
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::overrides::OverrideRepository;
use crate::repository::promotions::PromotionRepository;
use crate::repository::rules::RuleRepository;
use pharos_core::promotions::Redemption;
use pharos_core::{
    PriceRequest, PriceResolver, PricedLine, PricingError, PricingSnapshot, PromotionRejection,
    RedeemedLine, RoundingPolicy, ValidationError,
};

/// Price resolution backed by SQLite.
///
/// ## Usage
/// ```rust,ignore
/// let service = PricingService::new(db.clone(), config.rounding_policy());
///
/// // Quote (read-only)
/// let quote = service.resolve_price(&request).await?;
///
/// // Order placement
/// let mut tx = db.begin().await?;
/// let line = service.price_order_line(&mut tx, &request, &order.id).await?;
/// // ... insert order lines on the same tx ...
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PricingService {
    db: Database,
    resolver: PriceResolver,
}

impl PricingService {
    pub fn new(db: Database, policy: RoundingPolicy) -> Self {
        PricingService {
            db,
            resolver: PriceResolver::new(policy),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn resolver(&self) -> PriceResolver {
        self.resolver
    }

    /// Fetches everything one resolution may read.
    ///
    /// Unknown products or customers are request errors, not storage errors.
    pub async fn load_snapshot(
        conn: &mut SqliteConnection,
        request: &PriceRequest,
    ) -> ServiceResult<PricingSnapshot> {
        let product = CatalogRepository::fetch_product(conn, &request.product_id)
            .await?
            .ok_or_else(|| ValidationError::unknown("product", &request.product_id))?;
        let customer = CatalogRepository::fetch_customer(conn, &request.customer_id)
            .await?
            .ok_or_else(|| ValidationError::unknown("customer", &request.customer_id))?;

        let overrides =
            OverrideRepository::active_for_product(conn, &product.id, request.as_of).await?;
        let rules = RuleRepository::active_for_product(conn, &product, request.as_of).await?;
        let codes = &request.promotion_codes;
        let promotions = PromotionRepository::active_snapshot(conn, codes, &customer.id).await?;

        Ok(PricingSnapshot {
            product,
            customer,
            overrides,
            rules,
            promotions,
        })
    }

    /// Resolves a price without recording anything. For quotes and previews.
    pub async fn resolve_price(&self, request: &PriceRequest) -> ServiceResult<PricedLine> {
        let snapshot = {
            let mut conn = self.db.pool().acquire().await.map_err(DbError::from)?;
            Self::load_snapshot(&mut conn, request).await?
        };

        let line = self.resolver.resolve(&snapshot, request)?;

        debug!(
            product_id = %line.product_id,
            customer_id = %line.customer_id,
            unit_price = %line.unit_price,
            "Price quoted"
        );
        Ok(line)
    }

    /// Resolves a line and records its promotion usage on `tx`.
    ///
    /// The usage rows and counter increments become durable only when the
    /// caller commits `tx`. A rejected promotion leaves `tx` as it was.
    pub async fn price_order_line(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &PriceRequest,
        order_id: &str,
    ) -> ServiceResult<RedeemedLine> {
        let mut savepoint = Connection::begin(&mut **tx).await.map_err(DbError::from)?;

        let snapshot = Self::load_snapshot(&mut savepoint, request).await?;
        let line = self.resolver.resolve(&snapshot, request)?;

        let mut usages = Vec::with_capacity(line.applied_promotions.len());
        for applied in &line.applied_promotions {
            let promotion = snapshot
                .promotions
                .iter()
                .map(|s| &s.promotion)
                .find(|p| p.id == applied.promotion_id);

            let outcome = match promotion {
                Some(promotion) => {
                    let redemption = Redemption {
                        promotion,
                        customer_id: &line.customer_id,
                        order_id,
                        discount_applied: applied.line_discount.amount(),
                        used_at: request.as_of,
                    };
                    PromotionRepository::record_usage(&mut savepoint, &redemption).await?
                }
                None => Err(PromotionRejection::NotFound),
            };

            match outcome {
                Ok(usage) => usages.push(usage),
                Err(reason) => {
                    savepoint.rollback().await.map_err(DbError::from)?;
                    info!(
                        order_id = %order_id,
                        code = %applied.code,
                        reason = %reason,
                        "Promotion rejected at redemption"
                    );
                    return Err(PricingError::rejected(applied.code.clone(), reason).into());
                }
            }
        }

        savepoint.commit().await.map_err(DbError::from)?;

        info!(
            order_id = %order_id,
            product_id = %line.product_id,
            unit_price = %line.unit_price,
            promotions = usages.len(),
            "Order line priced"
        );
        Ok(RedeemedLine { line, usages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::pool::DbConfig;
    use chrono::{DateTime, TimeZone, Utc};
    use pharos_core::rules::QuantityRange;
    use pharos_core::{
        AdjustmentSource, Customer, CustomerTier, CustomerType, DiscountKind, DiscountRule,
        PriceCategory, PriceOverride, Product, Promotion, PromotionKind, PromotionTarget,
        RuleScope, ValidityWindow,
    };
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    fn promotion(id: &str, code: &str, usage_limit: Option<u32>) -> Promotion {
        Promotion {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("{code} campaign"),
            kind: PromotionKind::Percentage,
            value: dec!(10),
            buy_quantity: None,
            get_quantity: None,
            bundle_size: None,
            min_order_amount: None,
            max_discount: None,
            window: ValidityWindow::between(at(1), at(20)),
            usage_limit,
            per_customer_limit: None,
            usage_count: 0,
            target: PromotionTarget::everyone(),
            stacks_with_promotions: true,
            stacks_with_rules: true,
            is_active: true,
            created_at: at(1),
        }
    }

    async fn setup() -> PricingService {
        setup_with(DbConfig::in_memory()).await
    }

    /// List 100.00, contract override 90.00, hospital rule 10%, FLU10 capped at one use.
    async fn setup_with(config: DbConfig) -> PricingService {
        let db = Database::new(config).await.unwrap();

        db.catalog()
            .insert_product(&Product {
                id: "prod-vax".to_string(),
                name: "Influenza vaccine".to_string(),
                unit_price: dec!(100.00),
                tax_rate_bps: 1000,
                category_id: "cat-vaccines".to_string(),
                manufacturer_id: "mfr-bio".to_string(),
                is_active: true,
            })
            .await
            .unwrap();
        for id in ["cust-a", "cust-b"] {
            db.catalog()
                .insert_customer(&Customer {
                    id: id.to_string(),
                    name: format!("Hospital {id}"),
                    tier: CustomerTier::Standard,
                    customer_type: CustomerType::Hospital,
                    region_id: None,
                })
                .await
                .unwrap();
        }

        db.overrides()
            .insert(&PriceOverride {
                id: "ovr-vax".to_string(),
                product_id: "prod-vax".to_string(),
                region_id: None,
                customer_id: None,
                price_category: PriceCategory::Commercial,
                unit_price: dec!(90.00),
                window: ValidityWindow::always(),
                priority: 0,
                is_active: true,
                created_at: at(1),
            })
            .await
            .unwrap();

        db.rules()
            .insert(&DiscountRule {
                id: "rule-hospital".to_string(),
                name: "Hospitals 10%".to_string(),
                scope: RuleScope::Global,
                target_id: None,
                customer_tier: None,
                customer_type: Some(CustomerType::Hospital),
                customer_id: None,
                kind: DiscountKind::Percentage,
                value: dec!(10),
                quantity: QuantityRange::any(),
                window: ValidityWindow::always(),
                priority: 0,
                is_active: true,
                created_at: at(1),
            })
            .await
            .unwrap();

        db.promotions()
            .insert(&promotion("promo-flu10", "FLU10", Some(1)))
            .await
            .unwrap();

        PricingService::new(db, RoundingPolicy::default())
    }

    #[tokio::test]
    async fn test_resolve_price_end_to_end() {
        let service = setup().await;

        let line = service
            .resolve_price(&PriceRequest::new("prod-vax", "cust-a", 2, at(5)))
            .await
            .unwrap();
        assert_eq!(line.unit_price.amount(), dec!(81.00));
        assert_eq!(line.line_total.amount(), dec!(162.00));
        assert_eq!(line.tax_amount.amount(), dec!(16.20));

        let with_code = service
            .resolve_price(&PriceRequest::new("prod-vax", "cust-a", 2, at(5)).with_code("flu10"))
            .await
            .unwrap();
        assert_eq!(with_code.unit_price.amount(), dec!(72.90));
        assert_eq!(
            with_code.adjustments.last().map(|a| a.source),
            Some(AdjustmentSource::Promotion)
        );

        // Quoting never consumes the promotion
        let flu = service.database().promotions().get("promo-flu10").await.unwrap().unwrap();
        assert_eq!(flu.usage_count, 0);
    }

    #[tokio::test]
    async fn test_order_line_consumes_capped_promotion_once() {
        let service = setup().await;
        let request = PriceRequest::new("prod-vax", "cust-a", 1, at(5)).with_code("FLU10");

        let mut tx = service.database().begin().await.unwrap();
        let first = service
            .price_order_line(&mut tx, &request, "order-1")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.usages.len(), 1);
        assert_eq!(first.usages[0].discount_applied, dec!(8.10));

        let other = PriceRequest::new("prod-vax", "cust-b", 1, at(5)).with_code("FLU10");
        let mut tx = service.database().begin().await.unwrap();
        let err = service
            .price_order_line(&mut tx, &other, "order-2")
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert_eq!(
            err.pricing().and_then(PricingError::rejection),
            Some(PromotionRejection::UsageLimitReached)
        );
        assert!(service
            .database()
            .promotions()
            .is_consistent("promo-flu10")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_aborted_order_releases_the_slot() {
        let service = setup().await;
        let request = PriceRequest::new("prod-vax", "cust-a", 1, at(5)).with_code("FLU10");

        let mut tx = service.database().begin().await.unwrap();
        service
            .price_order_line(&mut tx, &request, "order-1")
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let promotions = service.database().promotions();
        assert_eq!(promotions.get("promo-flu10").await.unwrap().unwrap().usage_count, 0);
        assert!(promotions.usages_for("promo-flu10").await.unwrap().is_empty());

        let mut tx = service.database().begin().await.unwrap();
        let retry = service
            .price_order_line(&mut tx, &request, "order-1b")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(retry.usages.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_second_code_records_nothing() {
        let service = setup().await;
        service
            .database()
            .promotions()
            .insert(&promotion("promo-spring", "SPRING5", None))
            .await
            .unwrap();

        // Use up FLU10 on another order
        let mut tx = service.database().begin().await.unwrap();
        service
            .price_order_line(
                &mut tx,
                &PriceRequest::new("prod-vax", "cust-b", 1, at(5)).with_code("FLU10"),
                "order-0",
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let request = PriceRequest::new("prod-vax", "cust-a", 1, at(5))
            .with_code("SPRING5")
            .with_code("FLU10");
        let mut tx = service.database().begin().await.unwrap();
        let err = service
            .price_order_line(&mut tx, &request, "order-1")
            .await
            .unwrap_err();
        tx.commit().await.unwrap();

        assert!(matches!(
            err,
            ServiceError::Pricing(PricingError::Rejected {
                ref code,
                reason: PromotionRejection::UsageLimitReached,
            }) if code == "FLU10"
        ));
        let spring = service.database().promotions().get("promo-spring").await.unwrap().unwrap();
        assert_eq!(spring.usage_count, 0);
    }

    #[tokio::test]
    async fn test_expired_code_and_unknown_entities() {
        let service = setup().await;

        let err = service
            .resolve_price(&PriceRequest::new("prod-vax", "cust-a", 1, at(25)).with_code("FLU10"))
            .await
            .unwrap_err();
        assert_eq!(
            err.pricing().and_then(PricingError::rejection),
            Some(PromotionRejection::Expired)
        );

        let err = service
            .resolve_price(&PriceRequest::new("prod-missing", "cust-a", 1, at(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Pricing(PricingError::Validation(ValidationError::UnknownEntity { .. }))
        ));

        let err = service
            .resolve_price(&PriceRequest::new("prod-vax", "cust-a", 1, at(5)).with_code("NOPE"))
            .await
            .unwrap_err();
        assert_eq!(
            err.pricing().and_then(PricingError::rejection),
            Some(PromotionRejection::NotFound)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_orders_race_for_last_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("pharos.db")).max_connections(4);
        let service = Arc::new(setup_with(config).await);
        let barrier = Arc::new(Barrier::new(2));

        let mut handles = Vec::new();
        for (customer_id, order_id) in [("cust-a", "order-1"), ("cust-b", "order-2")] {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                let request =
                    PriceRequest::new("prod-vax", customer_id, 1, at(5)).with_code("FLU10");
                barrier.wait().await;

                let mut tx = service.database().begin().await?;
                let line = service.price_order_line(&mut tx, &request, order_id).await?;
                tx.commit().await.map_err(DbError::from)?;
                Ok::<_, ServiceError>(line)
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let committed = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .filter(|err| {
                err.pricing().and_then(PricingError::rejection)
                    == Some(PromotionRejection::UsageLimitReached)
            })
            .count();
        assert_eq!((committed, rejected), (1, 1), "{results:?}");

        let promotions = service.database().promotions();
        let flu = promotions.get("promo-flu10").await.unwrap().unwrap();
        assert_eq!(flu.usage_count, 1);
        assert_eq!(promotions.usages_for("promo-flu10").await.unwrap().len(), 1);
        assert!(promotions.is_consistent("promo-flu10").await.unwrap());
    }
}
