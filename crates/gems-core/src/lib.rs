//! Submission model and pure state machine for the background submission
//! pipeline. No I/O lives here; the queue and pipeline crates drive it.

pub mod backoff;
pub mod ids;
pub mod model;
pub mod transitions;
pub mod view;

pub use backoff::*;
pub use ids::*;
pub use model::*;
pub use transitions::*;
pub use view::*;
