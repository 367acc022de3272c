pub mod completion_client;
pub mod completion_interface;
pub mod factory;
pub mod openai_compatible;

pub use completion_client::CompletionClient;
pub use completion_interface::{CompletionBackend, CompletionInterface, CompletionRequest, APOLOGY};
pub use factory::CompletionFactory;
