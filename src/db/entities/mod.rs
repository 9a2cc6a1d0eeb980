//! SeaORM entities for the inventory tables.
//!
//! `vm_tags` is the join table behind the many-to-many `vms` <-> `tags` relation.

pub mod tag;
pub mod user;
pub mod vm;
pub mod vm_tag;

