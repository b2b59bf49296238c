// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod delivery;
pub mod quota;
pub mod reset;
pub mod run_due;
pub mod scheduling;
pub mod selection;

// Re-exports
pub use delivery::{DeliveryOutcome, DeliveryService};
pub use quota::{QuotaConsumption, QuotaService, QuotaStatus};
pub use reset::{ResetReport, ResetService};
pub use run_due::{JobOutcome, JobSpec, RunDefaults, RunDueService, RunOptions, RunReport};
pub use scheduling::DueScheduler;
pub use selection::{select_for_delivery, Selection};
