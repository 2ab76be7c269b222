//! Scribe Protocol - core types shared by every stage of delivery
//!
//! - `Event` - immutable structured log event with an ordered property map
//! - `Level` - totally ordered severity
//! - `Continuation` - single-shot completion callback
//! - `Envelope` - an event in flight together with its continuation
//! - `DeliveryError` / `ErrorKind` - per-event failure reporting
//!
//! # Design Principles
//!
//! - **Shared, not copied**: events fan out to several pipelines as `Arc<Event>`
//! - **Exactly-once completion**: continuations are consumed on completion and
//!   report `Abandoned` if dropped unfinished

mod continuation;
mod error;
mod event;
mod level;

pub use continuation::{Continuation, Envelope};
pub use error::{DeliveryError, DeliveryResult, ErrorKind};
pub use event::{Event, Properties, PropertyValue, next_sequence_id};
pub use level::{Level, ParseLevelError};
