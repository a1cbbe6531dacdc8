//! RAII guards that roll back half-created stack resources
//!
//! Every resource the deployment engine creates is wrapped in a guard.
//! Guards dropped without `commit()` hand their resource to the cleanup
//! executor, which deletes them in dependency order.

mod builder;
mod executor;
mod guard;
mod registry;
pub mod types;

pub use builder::ResourceGuardBuilder;
pub use executor::{CleanupExecutor, CleanupReport, ResourceCleaner, create_cleanup_system};
pub use guard::{Ec2InstanceGuard, InstanceRoleGuard, ResourceGuard, SecurityGroupGuard};
pub use registry::{CleanupMessage, ResourceRegistry};
pub use types::{ResourceId, ResourceMeta};
