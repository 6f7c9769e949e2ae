//! Server-side authoritative state
//!
//! [`StateStore`] owns the canonical entries and the [`LockTable`]. It is
//! transport agnostic: the gRPC service and the in-process transport both
//! call straight into it.

mod change_buffer;
mod lock_table;
mod state_store;

pub(crate) use change_buffer::*;
pub use lock_table::*;
pub use state_store::*;
