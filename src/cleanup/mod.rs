pub mod notifier;
pub mod scanner;
pub mod scheduler;

pub use notifier::{RecordingNotifier, SettlementEvent, SettlementNotifier, TracingNotifier};
pub use scanner::{CleanupReport, GameSettlementOutcome, ScannerConfig, SettlementAction, StaleGameScanner};
pub use scheduler::CleanupScheduler;
