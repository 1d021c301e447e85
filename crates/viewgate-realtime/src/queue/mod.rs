//! Admission queues, their registry, the liveness monitor, and the status board.

pub mod admission;
pub mod monitor;
pub mod participant;
pub mod registry;
pub mod status;

pub use admission::{AdmissionQueue, JoinOutcome, Mutation, MutationSink, Notice};
pub use participant::{Participant, ParticipantState, RemovalReason, ViewerEntry, ViewerStatus};
pub use status::{QueueStatus, QueueSummary, StatusBoard};
