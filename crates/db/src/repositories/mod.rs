//! Repository structs, one per table. Each takes `&PgPool` (or an open
//! transaction) and returns `sqlx::Error`.

pub mod audit_repo;
pub mod run_repo;
pub mod setting_repo;

pub use audit_repo::AuditLogRepo;
pub use run_repo::RunRepo;
pub use setting_repo::SettingRepo;
