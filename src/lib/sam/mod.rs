//! SAM/BAM record utilities and test builders.

pub mod builder;
pub mod record_utils;

pub use record_utils::{
    leading_soft_clip, read_name, reference_length, trailing_soft_clip,
};

use noodles::sam::Header;

/// Returns the sort order declared by the header's `@HD SO` field, if any.
#[must_use]
pub fn declared_sort_order(header: &Header) -> Option<&[u8]> {
    header.header().and_then(|hd| hd.other_fields().get(b"SO")).map(AsRef::as_ref)
}

/// Checks whether the header declares coordinate sorting.
///
/// Headers without an `SO` field return `false`; combine with
/// [`declared_sort_order`] to distinguish a missing declaration (fall back
/// to streaming validation) from a contradictory one (reject up front).
#[must_use]
pub fn is_coordinate_sorted(header: &Header) -> bool {
    declared_sort_order(header) == Some(b"coordinate".as_slice())
}
