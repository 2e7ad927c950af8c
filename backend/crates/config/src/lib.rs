pub mod env;
pub mod scheduler;
pub mod tracing_init;

pub use env::AppConfig;
pub use scheduler::SchedulerConfig;
pub use tracing_init::init_tracing;
