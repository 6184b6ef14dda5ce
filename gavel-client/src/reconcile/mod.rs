//! Merging paginated history with live pushes.
//!
//! A [`ReconciledSequence`] is the pure data structure: ordered, keyed by id,
//! and indifferent to the order pages and live items arrive in. A
//! [`Reconciler`] drives one sequence from a [`PageSource`] and publishes its
//! view.

mod order;
mod reconciler;
mod sequence;

pub use order::{NotificationKey, OrderPolicy, Reconcilable};
pub use reconciler::{LoadOutcome, PageSource, Reconciler};
pub use sequence::ReconciledSequence;
