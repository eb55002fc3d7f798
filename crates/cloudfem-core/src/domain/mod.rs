//! Domain model (ids, lifecycle, solver kinds, records, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod metadata;
pub mod naming;
pub mod old_task;
pub mod solver;
pub mod state;
pub mod task;

pub use self::errors::{ControllerError, HostError, RemoteError, SolverError, TaskError};
pub use self::events::DomainEvent;
pub use self::ids::{BucketId, RemoteTaskId};
pub use self::old_task::OldTaskRecord;
pub use self::solver::{DocumentObject, DocumentRef, ExecutionProfile, SolverKind, SolverRef};
pub use self::state::TaskStatus;
pub use self::task::{SubmitSettings, TaskRecord};
