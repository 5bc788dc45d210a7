mod bus;
mod queue;

pub use bus::{EventBus, Subscription};
pub use queue::{QueueError, TaskOutcome, TaskQueue, TaskRunner};
