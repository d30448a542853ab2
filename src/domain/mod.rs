//! Tagged domain records replacing the untyped dict-shaped results a
//! dynamically-typed reference implementation would pass around. Every
//! record here is owned by the store; other components hold ids, never
//! back-references.

pub mod city;
pub mod item;
pub mod matter;
pub mod meeting;
pub mod queue;

pub use city::{City, CityStatus, Zipcode};
pub use item::{AgendaItem, Attachment};
pub use matter::{MatterAppearance, MatterRecord, MatterStatus, VoteOutcome, VoteTally};
pub use meeting::{Meeting, MeetingStatus, ProcessingStatus};
pub use queue::{JobStatus, JobType, QueueJob};
