//! `gatehouse-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::{Entity, Timestamps};
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId, UserId};
pub use value_object::{Email, EntityName, ValueObject, MAX_TEXT_LEN};
