//! Snapshot application (coordinator) and validated writes (gateway).

pub mod coordinator;
pub mod gateway;

pub use coordinator::{Scope, SubscriptionCoordinator};
pub use gateway::{
    GatewayConfig, JoinOutcome, MutationGateway, NewProjectInput, NewTaskInput, Submission,
    TaskPatch, ValidationError,
};
