//! Automation primitives
//!
//! Waiting, element location and the signed-in browser session the workflow
//! engine builds on.

pub mod locator;
pub mod session;
pub mod wait;

pub use locator::{ElementLocator, Located};
pub use session::{AuthOutcome, CredentialSession};
pub use wait::{Clock, FakeClock, TokioClock, Waiter};
