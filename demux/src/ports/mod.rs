//! Capability sets the core depends on, supplied by concrete adapters at the
//! composition root. No inheritance chain: a caller implements these traits
//! for its chain client and its datastore, and hands the resulting values to
//! [`crate::reader::ActionReader`], [`crate::handler::ActionHandler`], and
//! [`crate::watcher::ActionWatcher`].

mod chain;
mod clock;
mod datastore;

pub use chain::ChainAdapter;
pub use clock::{Clock, FakeClock, SystemClock};
pub use datastore::DatastoreAdapter;
