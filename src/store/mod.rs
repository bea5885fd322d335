//! Persistence layer — trait definitions and the libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    AuditRecord, AuditSink, ConfigStore, DomainTrust, OpenActionStore, PatternRegistry,
    PatternStats, SenderTrustStore,
};
