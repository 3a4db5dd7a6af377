pub mod manual;
pub mod reconciler;

pub use reconciler::{Reconciler, RunOutcome};
