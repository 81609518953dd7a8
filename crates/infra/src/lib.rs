//! Infrastructure layer: stores, application services, projections, seeding.

pub mod projections;
pub mod seed;
pub mod services;
pub mod store;

pub use projections::{AccessQueries, PermissionSummary, RoleListing, UserListing};
pub use seed::{SeedReport, Seeder};
pub use services::{
    AssignmentService, PermissionService, RoleService, RoleSetPolicy, ServiceError, ServiceResult,
    SyncReport, UserService,
};
pub use store::{AccessStore, AccessTx, InMemoryAccessStore, PostgresAccessStore, StoreError};
