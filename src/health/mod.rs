//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! UI "test" / "test all"        → checker.rs check / check_all
//! activate_backend              → checker.rs check_backend
//! select_healthy_backend        → checker.rs first_healthy
//!
//! Group-scoped probes use the strict form when the group has a
//! health_check_path, the liveness form otherwise.
//! ```
//!
//! # Design Decisions
//! - Probes run only on request; there is no background monitor
//! - A failed probe never changes routing by itself
//! - Liveness form: any completed response counts as healthy
//! - Strict form: exactly 200 on the group's health check path

pub mod checker;

pub use checker::HealthChecker;
