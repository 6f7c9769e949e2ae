pub mod async_task;
pub(crate) mod scoped_timer;
