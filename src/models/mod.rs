pub mod events;
pub mod loaders;
pub mod session;
pub mod task;
pub mod work_item;

pub use events::{BatchEvent, ChallengeKind, StatusEvent};
pub use loaders::{load_job_file, DriverScripts, JobFile};
pub use session::{Credential, SessionSpec};
pub use task::{ArtifactRef, Task, TaskOutcome, TaskReport, TaskStatus, WorkItemRef};
pub use work_item::{ArtifactClass, Payload, WorkItem};
