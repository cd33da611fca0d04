//! Service layer for admissions-crm
//!
//! Services sit between HTTP handlers and the repositories:
//! - Input validation
//! - NotFound mapping for lookups scoped to a tenant
//! - Event emission after committed writes
//! - Transaction boundaries
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod parent_service;
pub mod response;

pub use events::{EventBus, EventListener, StorageEvent};
pub use parent_service::ParentService;

use crate::db::ParentDb;
use std::sync::Arc;

/// Service container handed to the HTTP server
pub struct Services {
    pub parents: Arc<ParentService>,
    pub events: Arc<EventBus>,
    pub db: Arc<ParentDb>,
}

impl Services {
    pub fn new(db: Arc<ParentDb>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            parents: Arc::new(ParentService::new(db.clone(), events.clone())),
            events,
            db,
        }
    }
}
