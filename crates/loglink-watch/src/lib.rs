//! loglink watch - wakes the reconciliation loop when a managed root is
//! changed behind its back

mod debounce;
mod watcher;

pub use debounce::Debouncer;
pub use watcher::{RootWatcher, WatchConfig};
