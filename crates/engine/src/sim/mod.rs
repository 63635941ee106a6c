mod registry;
mod scheduler;

pub use registry::{Registry, RegistryError, WorldId};
pub use scheduler::{
    seconds_to_ticks, CallbackHandle, DueCallback, ScheduledEntry, Scheduler, SchedulerError,
    SchedulerSnapshot, DEFAULT_TICKS_PER_SECOND,
};
