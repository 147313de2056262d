//! Client-runtime half of the coordinator: the refresh scheduler and the
//! cookie jar it mirrors sessions into.

mod jar;
mod scheduler;

pub use jar::{ClientCookieJar, MemoryCookieJar};
pub use scheduler::{RefreshScheduler, SchedulerConfig, SchedulerPhase, TickOutcome};
