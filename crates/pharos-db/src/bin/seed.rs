//! # Seed Data Generator
//!
//! Populates the database with a demo pharmaceutical catalog and pricing
//! definitions, then prints a few resolved lines.
//!
//! ## Usage
//! ```bash
//! # Seed ./pharos.db (or $PHAROS_DB_PATH)
//! cargo run -p pharos-db --bin seed
//!
//! # Specify database path
//! cargo run -p pharos-db --bin seed -- --db ./data/pharos.db
//! ```
//!
//! ## Generated Data
//! - Products across analgesics, antibiotics and vaccines
//! - Pharmacy, hospital and wholesale customers
//! - Contract and regional price overrides
//! - Global, category and manufacturer discount rules
//! - Promotions: FLU10 (capped), BOGO-VAX (buy 2 get 1), NEWPHARM (fixed amount)

use chrono::{Duration, Utc};
use pharos_core::rules::QuantityRange;
use pharos_core::{
    Customer, CustomerTier, CustomerType, DiscountKind, DiscountRule, PriceCategory,
    PriceOverride, PriceRequest, Product, Promotion, PromotionKind, PromotionTarget, RuleScope,
    ValidityWindow,
};
use pharos_db::{generate_id, Database, PharosConfig, PricingService};
use rust_decimal::Decimal;
use std::env;
use tracing_subscriber::EnvFilter;

/// (id, name, list price in cents, tax bps, category, manufacturer)
const PRODUCTS: &[(&str, &str, i64, u32, &str, &str)] = &[
    ("prod-para-500", "Paracetamol 500mg x20", 349, 700, "cat-analgesics", "mfr-medipharm"),
    ("prod-ibu-400", "Ibuprofen 400mg x24", 525, 700, "cat-analgesics", "mfr-medipharm"),
    ("prod-amox-500", "Amoxicillin 500mg x20", 1240, 700, "cat-antibiotics", "mfr-medipharm"),
    ("prod-azi-250", "Azithromycin 250mg x6", 1875, 700, "cat-antibiotics", "mfr-novagen"),
    ("prod-flu-vax", "Influenza vaccine 0.5ml", 2190, 1000, "cat-vaccines", "mfr-biovac"),
    ("prod-hepb-vax", "Hepatitis B vaccine 1ml", 4460, 1000, "cat-vaccines", "mfr-biovac"),
];

/// (id, name, tier, type, region)
const CUSTOMERS: &[(&str, &str, CustomerTier, CustomerType, Option<&str>)] = &[
    (
        "cust-corner",
        "Corner Pharmacy",
        CustomerTier::Basic,
        CustomerType::Pharmacy,
        Some("region-south"),
    ),
    (
        "cust-stmary",
        "St. Mary Hospital",
        CustomerTier::Premium,
        CustomerType::Hospital,
        Some("region-north"),
    ),
    (
        "cust-medco",
        "MedCo Wholesale",
        CustomerTier::Standard,
        CustomerType::Wholesale,
        None,
    ),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pharos=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut config = PharosConfig::load()?;

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.db_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pharos Pricing Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path");
                println!("                     (default: $PHAROS_DB_PATH or ./pharos.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Pharos Pricing Seed Data Generator");
    println!("====================================");
    println!("Database: {}", config.db_path.display());
    println!("Currency: {} (scale {})", config.currency_code, config.currency_scale);
    println!();

    let db = Database::new(config.db_config()).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().count_products().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
    } else {
        seed(&db).await?;
    }

    println!();
    println!("Resolving sample lines...");

    let service = PricingService::new(db.clone(), config.rounding_policy());
    let now = Utc::now();
    let samples = [
        PriceRequest::new("prod-amox-500", "cust-stmary", 40, now),
        PriceRequest::new("prod-flu-vax", "cust-corner", 12, now).with_code("FLU10"),
        PriceRequest::new("prod-flu-vax", "cust-stmary", 30, now).with_code("BOGO-VAX"),
        PriceRequest::new("prod-ibu-400", "cust-medco", 200, now)
            .with_category(PriceCategory::Institutional),
    ];

    for request in &samples {
        match service.resolve_price(request).await {
            Ok(line) => println!("{}", serde_json::to_string_pretty(&line)?),
            Err(e) => println!("  {} for {}: {}", request.product_id, request.customer_id, e),
        }
    }

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

async fn seed(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let season = ValidityWindow::between(now - Duration::days(30), now + Duration::days(90));

    for (id, name, cents, tax, category, manufacturer) in PRODUCTS {
        db.catalog()
            .insert_product(&Product {
                id: id.to_string(),
                name: name.to_string(),
                unit_price: Decimal::new(*cents, 2),
                tax_rate_bps: *tax,
                category_id: category.to_string(),
                manufacturer_id: manufacturer.to_string(),
                is_active: true,
            })
            .await?;
    }
    println!("✓ Inserted {} products", PRODUCTS.len());

    for (id, name, tier, customer_type, region) in CUSTOMERS {
        db.catalog()
            .insert_customer(&Customer {
                id: id.to_string(),
                name: name.to_string(),
                tier: *tier,
                customer_type: *customer_type,
                region_id: region.map(str::to_string),
            })
            .await?;
    }
    println!("✓ Inserted {} customers", CUSTOMERS.len());

    let overrides = [
        // Hospital contract price on amoxicillin
        PriceOverride {
            customer_id: Some("cust-stmary".to_string()),
            ..price_override("prod-amox-500", Decimal::new(1050, 2))
        },
        // Regional price in the south
        PriceOverride {
            region_id: Some("region-south".to_string()),
            ..price_override("prod-flu-vax", Decimal::new(1990, 2))
        },
        // Institutional tender price
        PriceOverride {
            price_category: PriceCategory::Institutional,
            ..price_override("prod-ibu-400", Decimal::new(410, 2))
        },
    ];
    for ovr in &overrides {
        db.overrides().insert(ovr).await?;
    }
    println!("✓ Inserted {} price overrides", overrides.len());

    let rules = [
        DiscountRule {
            name: "Premium customers 5%".to_string(),
            customer_tier: Some(CustomerTier::Premium),
            ..rule(RuleScope::Global, None, DiscountKind::Percentage, Decimal::new(5, 0))
        },
        DiscountRule {
            name: "Antibiotics volume 8% from 24 units".to_string(),
            quantity: QuantityRange {
                min_quantity: Some(24),
                max_quantity: None,
            },
            priority: 10,
            ..rule(
                RuleScope::Category,
                Some("cat-antibiotics"),
                DiscountKind::Percentage,
                Decimal::new(8, 0),
            )
        },
        DiscountRule {
            name: "MediPharm wholesale 0.40 off".to_string(),
            customer_type: Some(CustomerType::Wholesale),
            ..rule(
                RuleScope::Manufacturer,
                Some("mfr-medipharm"),
                DiscountKind::FixedAmount,
                Decimal::new(40, 2),
            )
        },
    ];
    for r in &rules {
        db.rules().insert(r).await?;
    }
    println!("✓ Inserted {} discount rules", rules.len());

    let promotions = [
        Promotion {
            usage_limit: Some(100),
            per_customer_limit: Some(3),
            max_discount: Some(Decimal::new(5000, 2)),
            ..promotion(
                "FLU10",
                "Flu season 10%",
                PromotionKind::Percentage,
                Decimal::new(10, 0),
                season,
            )
        },
        Promotion {
            buy_quantity: Some(2),
            get_quantity: Some(1),
            stacks_with_rules: false,
            target: PromotionTarget {
                product_ids: vec!["prod-flu-vax".to_string(), "prod-hepb-vax".to_string()],
                ..PromotionTarget::everyone()
            },
            ..promotion(
                "BOGO-VAX",
                "Vaccines buy 2 get 1",
                PromotionKind::BuyXGetY,
                Decimal::ZERO,
                season,
            )
        },
        Promotion {
            min_order_amount: Some(Decimal::new(10000, 2)),
            per_customer_limit: Some(1),
            target: PromotionTarget {
                customer_type: Some(CustomerType::Pharmacy),
                ..PromotionTarget::everyone()
            },
            ..promotion(
                "NEWPHARM",
                "New pharmacy welcome",
                PromotionKind::FixedAmount,
                Decimal::new(1500, 2),
                season,
            )
        },
    ];
    for p in &promotions {
        db.promotions().insert(p).await?;
    }
    println!("✓ Inserted {} promotions", promotions.len());

    Ok(())
}

fn price_override(product_id: &str, unit_price: Decimal) -> PriceOverride {
    PriceOverride {
        id: generate_id(),
        product_id: product_id.to_string(),
        region_id: None,
        customer_id: None,
        price_category: PriceCategory::Commercial,
        unit_price,
        window: ValidityWindow::always(),
        priority: 0,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn rule(
    scope: RuleScope,
    target_id: Option<&str>,
    kind: DiscountKind,
    value: Decimal,
) -> DiscountRule {
    DiscountRule {
        id: generate_id(),
        name: String::new(),
        scope,
        target_id: target_id.map(str::to_string),
        customer_tier: None,
        customer_type: None,
        customer_id: None,
        kind,
        value,
        quantity: QuantityRange::any(),
        window: ValidityWindow::always(),
        priority: 0,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn promotion(
    code: &str,
    name: &str,
    kind: PromotionKind,
    value: Decimal,
    window: ValidityWindow,
) -> Promotion {
    Promotion {
        id: generate_id(),
        code: code.to_string(),
        name: name.to_string(),
        kind,
        value,
        buy_quantity: None,
        get_quantity: None,
        bundle_size: None,
        min_order_amount: None,
        max_discount: None,
        window,
        usage_limit: None,
        per_customer_limit: None,
        usage_count: 0,
        target: PromotionTarget::everyone(),
        stacks_with_promotions: false,
        stacks_with_rules: true,
        is_active: true,
        created_at: Utc::now(),
    }
}
