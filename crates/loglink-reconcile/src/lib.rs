//! loglink reconcile - desired state, actual state, plan, apply
//!
//! One pass is `Resolver::resolve` → `scan` → `plan` → `Applier::apply`.
//! Nothing here is kept between passes; the managed roots are re-read every time.

mod actual;
mod apply;
mod link;
mod plan;
mod resolve;

pub use actual::{scan, ActualEntry, ActualState};
pub use apply::{AppliedResult, Applier, SkippedOp};
pub use link::{DesiredMapping, LinkKind, LogLinkSpec};
pub use plan::{plan, Operation, ReconciliationPlan};
pub use resolve::Resolver;
