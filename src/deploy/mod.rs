pub mod error;
pub mod events;
pub mod fsm;
pub mod guard;
mod orchestrator;
pub mod templates;
pub mod workspace;

pub use error::DeployError;
pub use events::{EventKind, EventStream, ProgressEmitter, ProgressEvent};
pub use fsm::{Phase, Plan};
pub use guard::{DeploymentGuard, GuardPermit};
pub use orchestrator::Deployer;
pub use workspace::{BuildOutput, Package, ShellWorkspace, Workspace, WorkspaceError};
