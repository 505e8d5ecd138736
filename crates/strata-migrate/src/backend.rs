//! The backend seam a migration session talks to.

use crate::command::ExistsTarget;
use crate::error::Result;
use crate::schema::{ColumnType, Reference};

/// What a session needs from the storage backend while commands are built.
///
/// Executing the recorded commands is not part of this trait; a session only
/// checks for existence and asks how foreign-key columns are stored.
pub trait MigrationBackend {
    /// Returns whether the table or index currently exists.
    fn exists(&self, target: &ExistsTarget) -> Result<bool>;

    /// Returns the storage type of a column referencing `reference`.
    fn reference_type(&self, reference: &Reference) -> ColumnType {
        reference.ty.reference_storage()
    }
}

impl<B: MigrationBackend + ?Sized> MigrationBackend for &B {
    fn exists(&self, target: &ExistsTarget) -> Result<bool> {
        (**self).exists(target)
    }

    fn reference_type(&self, reference: &Reference) -> ColumnType {
        (**self).reference_type(reference)
    }
}
