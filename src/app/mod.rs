pub mod context;
pub mod error;

pub use context::{AppContext, BatchOutcome, TimelineClient, UserFailure, UserTimeline};
pub use error::{FeederError, Result};
