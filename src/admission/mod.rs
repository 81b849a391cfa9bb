//! Fixed-window admission control and its state.

mod clock;
mod controller;
mod decision;
mod identity;
mod policy;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::AdmissionController;
pub use decision::{retry_after_secs, AdmissionDecision};
pub use identity::{ClientIdentity, RequestMetadata, MAX_IDENTITY_LEN};
pub use policy::{Policy, PolicyConfig, PolicyRegistry, ProtectedOperation, MAX_WINDOW};
pub use sweeper::{Sweeper, MIN_SWEEP_INTERVAL};
pub use window::{SlotKey, WindowState, WindowStore};
