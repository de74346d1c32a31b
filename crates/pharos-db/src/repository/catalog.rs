//! # Catalog Repository
//!
//! Products and customers, as the pricing engine sees them.
//!
//! The catalog is owned by other subsystems; the engine only reads it.
//! The write methods here exist for administration and seeding.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{parse_decimal, to_u32};
use pharos_core::validation::{validate_id, validate_product};
use pharos_core::{Customer, CustomerTier, CustomerType, Product};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    unit_price: String,
    tax_rate_bps: i64,
    category_id: String,
    manufacturer_id: String,
    is_active: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> DbResult<Self> {
        Ok(Product {
            unit_price: parse_decimal("products.unit_price", &row.unit_price)?,
            tax_rate_bps: to_u32("products.tax_rate_bps", row.tax_rate_bps)?,
            id: row.id,
            name: row.name,
            category_id: row.category_id,
            manufacturer_id: row.manufacturer_id,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    tier: CustomerTier,
    customer_type: CustomerType,
    region_id: Option<String>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            tier: row.tier,
            customer_type: row.customer_type,
            region_id: row.region_id,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for products and customers.
///
/// ## Usage
/// ```rust,ignore
/// let catalog = db.catalog();
///
/// catalog.insert_product(&product).await?;
/// let product = catalog.get_product("prod-amox-500").await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Inserts a product after validating it.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        validate_product(product)?;
        let now = Utc::now();

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, unit_price, tax_rate_bps, category_id, manufacturer_id,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit_price.to_string())
        .bind(i64::from(product.tax_rate_bps))
        .bind(&product.category_id)
        .bind(&product.manufacturer_id)
        .bind(product.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates list price, tax, grouping and the active flag of a product.
    pub async fn update_product(&self, product: &Product) -> DbResult<()> {
        validate_product(product)?;

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                unit_price = ?3,
                tax_rate_bps = ?4,
                category_id = ?5,
                manufacturer_id = ?6,
                is_active = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit_price.to_string())
        .bind(i64::from(product.tax_rate_bps))
        .bind(&product.category_id)
        .bind(&product.manufacturer_id)
        .bind(product.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        debug!(id = %product.id, "Product updated");
        Ok(())
    }

    /// Gets a product by its ID, active or not.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_product(&mut conn, id).await
    }

    /// Number of products in the catalog.
    pub async fn count_products(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count).map_err(|_| DbError::corrupt("products.count", count))
    }

    /// Reads a product on the caller's connection or transaction.
    pub async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, unit_price, tax_rate_bps, category_id, manufacturer_id, is_active
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Product::try_from).transpose()
    }

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    /// Inserts a customer.
    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        validate_id("customer.id", &customer.id)?;

        debug!(id = %customer.id, tier = ?customer.tier, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, tier, customer_type, region_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.tier)
        .bind(customer.customer_type)
        .bind(&customer.region_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a customer by its ID.
    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_customer(&mut conn, id).await
    }

    /// Reads a customer on the caller's connection or transaction.
    pub async fn fetch_customer(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, name, tier, customer_type, region_id
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(Customer::from))
    }
}
