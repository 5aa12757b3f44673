mod definition;
mod policy;

pub use definition::{Cardinality, RejectRule, StageConfig, StepConfig, WorkflowDefinition};
pub use policy::{FieldRule, FieldSet};
