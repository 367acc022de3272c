pub mod dedupe;
pub mod extraction;
pub mod fill;
pub mod normalizer;
pub mod schema;
pub mod shapes;
pub mod store;
pub mod types;

pub use extraction::{ExtractionResult, FormFieldExtractionPipeline};
pub use fill::{FillResult, FormFillPipeline, UserProfile, ASK_USER};
pub use schema::{FormSchema, FormSchemaService};
pub use store::{FormKey, FormStore, HttpFormStore, InMemoryFormStore};
pub use types::{FieldType, FormField, FormFieldSet};
