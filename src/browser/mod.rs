//! Browser automation module
//!
//! The [`Browser`] capability trait, the agent-browser CLI driver that
//! implements it, an in-memory fake for tests, and profile locking.

mod executor;
pub mod fake;
mod profile;
mod snapshot;
mod traits;

pub use executor::AgentBrowser;
pub use fake::{FakeAction, FakeBrowser};
pub use profile::ProfileLock;
pub use snapshot::{Element, Snapshot};
pub use traits::{Browser, ElementHandle};
