//! Storage layer - SQLite graph store
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `graph_store`: [`GraphStore`](crate::domain::graph::GraphStore) over SQLite
//! - `memory`: [`GraphStore`](crate::domain::graph::GraphStore) over in-process maps
//!
//! # Usage
//!
//! ```ignore
//! use graphrag_core::storage::{Database, SqliteGraphStore};
//!
//! let db = Database::in_memory().await?;
//! let store = SqliteGraphStore::new(db.pool().clone());
//! ```

pub mod database;
pub mod graph_store;
pub mod memory;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use graph_store::SqliteGraphStore;
pub use memory::InMemoryGraphStore;
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
