//! Bitmask permission model.

/// Permission bit assigned to read operations.
pub const READ: u32 = 1;
/// Permission bit assigned to create operations.
pub const WRITE: u32 = 2;
/// Permission bit assigned to update operations.
pub const UPDATE: u32 = 4;
/// Permission bit assigned to delete operations.
pub const DELETE: u32 = 8;
/// All permission bits combined.
pub const ALL: u32 = READ | WRITE | UPDATE | DELETE;

/// Check whether a granted permission mask covers a required mask.
///
/// The grant must cover every bit the operation requires, not merely
/// overlap one of them: a requirement of WRITE is not satisfied by a
/// grant of READ, and a requirement of WRITE|DELETE is not satisfied
/// by a grant of WRITE alone.
pub fn has_permission(granted: u32, required: u32) -> bool {
    granted & required == required
}
