//! Client-side session: the mirror of server state plus the write path.

mod observers;
mod pending_write;
mod session;

pub(crate) use observers::Observers;
pub use observers::Subscription;
pub use pending_write::*;
pub use session::*;
