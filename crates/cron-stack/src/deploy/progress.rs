//! Progress reporting for deployments
//!
//! The engine only talks to a [`DeployReporter`]; the CLI logs through
//! [`LogReporter`] and tests record what they are told.

use cron_stack_common::stack::{LogicalId, ResourceType};
use tracing::info;

/// Coarse deployment phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    /// Resolving account, existing resources and the network
    Preflight,
    /// Creating resources in declaration order
    Provisioning,
    /// Waiting for the instance to reach `running`
    WaitingForInstance,
    /// Marking resources `active`
    Finalizing,
    /// Deleting what was created after a failure or cancellation
    RollingBack,
}

/// Lifecycle of one declared resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    CreateInProgress,
    /// Created; `physical_id` is the AWS identifier
    CreateComplete { physical_id: String },
    /// Looked up or reused rather than created
    Resolved { physical_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub logical_id: LogicalId,
    pub resource_type: ResourceType,
    pub status: ResourceStatus,
}

/// Receives deployment progress
pub trait DeployReporter: Send + Sync {
    fn report_phase(&self, phase: DeployPhase);

    fn report_resource(&self, update: ResourceUpdate);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl DeployReporter for LogReporter {
    fn report_phase(&self, phase: DeployPhase) {
        info!(phase = ?phase, "Deployment phase");
    }

    fn report_resource(&self, update: ResourceUpdate) {
        let type_name = update.resource_type.type_name();
        match update.status {
            ResourceStatus::CreateInProgress => {
                info!(logical_id = %update.logical_id, resource_type = type_name, "CREATE_IN_PROGRESS");
            }
            ResourceStatus::CreateComplete { physical_id } => {
                info!(
                    logical_id = %update.logical_id,
                    resource_type = type_name,
                    physical_id = %physical_id,
                    "CREATE_COMPLETE"
                );
            }
            ResourceStatus::Resolved { physical_id } => {
                info!(
                    logical_id = %update.logical_id,
                    resource_type = type_name,
                    physical_id = %physical_id,
                    "RESOLVED"
                );
            }
        }
    }
}
