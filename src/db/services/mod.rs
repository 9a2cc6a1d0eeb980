//! The `services` module provides the registries the HTTP layer calls into.
//!
//! Each sub-module owns one area (tags, VMs, assignments, users) and returns
//! `Result<_, AppError>` so handlers can pass failures straight through.
//! Operations that touch more than one row run in a single transaction.

pub mod assignment_service;
pub mod filters;
pub mod tag_service;
pub mod user_service;
pub mod vm_service;

pub use assignment_service::{AssignmentAction, AssignmentOutcome};
pub use tag_service::{TagFilter, TagSpec};
pub use user_service::{Requester, TagCapability, RESERVED_ADMIN_USER_ID};
pub use vm_service::{TagSummary, VmQuery, VmWithTags};
