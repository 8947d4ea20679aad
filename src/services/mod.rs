pub mod artifact_fetcher;
pub mod challenge_resolver;
pub mod clearance_cache;
pub mod event_sink;
pub mod readiness_poller;
pub mod scripted_driver;
pub mod work_driver;
pub mod work_queue;

pub use artifact_fetcher::ArtifactFetcher;
pub use challenge_resolver::{ChallengeOutcome, ChallengeResolver, ChallengeState, SessionGate};
pub use clearance_cache::ClearanceCache;
pub use event_sink::{spawn_dispatcher, BatchCallbacks, EventSink};
pub use readiness_poller::{PollOutcome, ReadinessPoller};
pub use scripted_driver::ScriptedDriver;
pub use work_driver::{Artifact, Submission, WorkDriver};
pub use work_queue::WorkQueue;
