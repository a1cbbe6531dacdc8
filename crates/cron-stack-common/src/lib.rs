//! cron-stack-common - Stack declaration types
//!
//! This crate holds the declarative half of cron-stack: the stack definition
//! and the resource types it is composed of. It has no AWS SDK dependencies,
//! so a stack can be declared, synthesized and inspected offline.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`resource_kind`]: AWS resource kinds and teardown ordering
//! - [`stack`]: The stack definition graph and its resources
//! - [`tags`]: AWS resource tag constants for discovery and teardown

pub mod defaults;
pub mod resource_kind;
pub mod stack;
pub mod tags;

// Re-export commonly used types
pub use resource_kind::ResourceKind;
pub use stack::{StackDefinition, StackError, StackProps, define_stack};
