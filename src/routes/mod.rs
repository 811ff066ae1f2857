/// Router Module Index
///
/// Access control lives in the extractors (`RequestContext`, `AdminUser`), so
/// the split below is by concern rather than by middleware:
/// - `public`: health, accounts and the open newsletter endpoint.
/// - `collections`: the generic CRUD surface plus the key/value collections.
/// - `admin`: endpoints that are admin-only in their entirety.
pub mod public;

pub mod collections;

pub mod admin;
