//! Domain models: works, entry kinds, people, attached files.

mod kind;
mod person;
mod work;

pub use kind::{EntryKind, FieldSpec};
pub use person::Person;
pub use work::{AttachedFile, Work, WorkFields};
