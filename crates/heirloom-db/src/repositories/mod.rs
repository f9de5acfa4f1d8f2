//! Repositories mapping domain models onto the record store.

mod draft;
mod letter;

pub use draft::DraftRepository;
pub use letter::{LetterRepository, VersionPage};

/// A stored value with the revision needed for a later conditional write.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: i64,
}
