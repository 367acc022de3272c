pub mod actions;
pub mod agency_directory;
pub mod clarification;
pub mod intent;
pub mod router;
pub mod types;

pub use agency_directory::AgencyDirectory;
pub use clarification::ClarificationGate;
pub use intent::IntentClassifier;
pub use router::ResponseRouter;
pub use types::*;
