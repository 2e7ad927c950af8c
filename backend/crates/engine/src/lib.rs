pub mod checkpoint;
pub mod control;
pub mod coordinator;
pub mod executor;
pub mod lifecycle;
pub mod pg_executor;
pub mod scheduler;
pub mod slots;

pub use control::{PutOutcome, TransformControl};
pub use coordinator::{ExecutionCoordinator, TickOutcome, TickPolicy};
pub use executor::{ExecutionError, UnitExecutor, UnitOutcome, UnitRequest};
pub use lifecycle::JobCommand;
pub use pg_executor::PgProjectionExecutor;
pub use scheduler::Scheduler;
pub use slots::{ExecutionSlots, SlotGuard};
