mod client;
mod connection;
mod credential;
pub mod error;
mod poller;
mod status;

pub use client::{
    ClientOptions, DremioClient, ReflectionSpec, ReflectionSummary, SourceSpec, SourceSummary,
};
pub use connection::{ConnectionExtra, ConnectionRecord};
pub use credential::{AuthKind, AuthMode, AuthToken, CredentialResolver};
pub use poller::{
    JobStatusProbe, Observation, PollOptions, PollOutcome, Poller, ReflectionStatusProbe,
    StatusProbe,
};
pub use status::{
    JobState, JobStatus, KnownJobState, ReflectionRefreshStatus, StateClass, TerminalState,
};
