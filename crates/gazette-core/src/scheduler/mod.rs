mod service;

pub(crate) use service::wait_for_shutdown;
pub use service::{SchedulerEvent, SchedulerService};
