mod collection;
mod error;
mod field_walker;
mod project;

pub use collection::Collection;
pub use error::OperationFailure;
pub use field_walker::{FieldValues, FieldWalker};
pub use project::Projector;
