//! API surface model: functions, resource kinds and their lifecycles.

mod machine;
mod model;
mod schema;

pub use machine::{
    to_dot, IssueSeverity, MachineIssue, MachineReport, ReachabilityInfo,
    ResourceMachineValidator,
};
pub use model::SurfaceModel;
pub use schema::{
    ApiFunction, ParamKind, ParamSpec, ResourceKind, ReturnSpec, Role, StateTransition, Storage,
    SurfaceError, SurfaceSpec,
};
