pub mod guard;
pub mod ids;
pub mod scheduler;
pub mod workflow;

pub use guard::AuthorizationGuard;
pub use ids::{IdError, IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use scheduler::{ReminderScheduler, SweepReport};
pub use workflow::{Resolution, WorkflowEngine, WorkflowError, WorkflowResult};
