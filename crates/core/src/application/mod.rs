// Application Layer - Use Cases

pub mod intake;
pub mod lifecycle;
pub mod maintenance;
pub mod recovery;
pub mod worker;

// Re-exports
pub use intake::{IntakeService, SubmitReceipt, SubmitRequest};
pub use lifecycle::{JobOutcome, LifecycleController, LifecycleSettings};
pub use maintenance::MaintenanceScheduler;
pub use recovery::{RedeliveryReport, RedeliveryService};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker};
