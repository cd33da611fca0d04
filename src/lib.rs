//! Admissions CRM - multi-tenant lead management backend
//!
//! Stores prospective-student parents (leads) per school customer and
//! serves search, scoring, funnel statistics and activity timelines.
//!
//! ## Architecture
//!
//! - **db**: Diesel/SQLite repositories; every query is scoped by a
//!   [`TenantContext`](db::TenantContext)
//! - **services**: validation, NotFound mapping and change events
//! - **http**: hyper router over the services
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── crm.db          # SQLite database (WAL mode)
//! └── config.toml     # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;

pub use config::Config;
pub use db::{ParentDb, TenantContext};
pub use error::StorageError;
pub use http::HttpServer;
pub use services::{ParentService, Services};
