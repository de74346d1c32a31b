//! # pharos-db: Data-Store Boundary for the Pharos Pricing Engine
//!
//! This crate feeds `pharos-core` from SQLite and records promotion usage.
//! It uses sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pharos Pricing Data Flow                         │
//! │                                                                         │
//! │  Order subsystem (price_order_line on its own transaction)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pharos-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │PricingService │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (service.rs)  │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ Catalog       │    │              │  │   │
//! │  │   │ snapshot ─────┼───►│ Overrides     │    │ 001_pricing_ │  │   │
//! │  │   │ resolve       │    │ Rules         │    │   schema.sql │  │   │
//! │  │   │ record usage  │    │ Promotions    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            Database (pool.rs) · PharosConfig (config.rs)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`config`] - Environment configuration
//! - [`repository`] - Repository implementations (catalog, overrides, rules, promotions)
//! - [`service`] - PricingService
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pharos_db::{Database, PharosConfig, PricingService};
//!
//! let config = PharosConfig::load()?;
//! let db = Database::new(config.db_config()).await?;
//! let service = PricingService::new(db.clone(), config.rounding_policy());
//!
//! let mut tx = db.begin().await?;
//! let line = service.price_order_line(&mut tx, &request, &order_id).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, PharosConfig};
pub use error::{DbError, DbResult, ServiceError, ServiceResult};
pub use pool::{Database, DbConfig};
pub use service::PricingService;

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::generate_id;
pub use repository::overrides::OverrideRepository;
pub use repository::promotions::PromotionRepository;
pub use repository::rules::RuleRepository;
