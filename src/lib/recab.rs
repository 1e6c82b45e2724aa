//! Seam for the external base-quality recalibration component.
//!
//! Recalibration is a separate concern living outside this crate. The engine
//! only needs three touch points: every non-duplicate record retired during
//! pass 1 feeds the model, the fitted model is emitted before pass 2 writes
//! records, and every written record has the model applied to its qualities.

use std::io;
use std::path::Path;

use noodles::sam::alignment::RecordBuf;

/// Hooks invoked by the duplicate-marking passes when recalibration is
/// configured.
pub trait Recalibrator {
    /// Accumulates a non-duplicate record into the recalibration model.
    fn observe(&mut self, record: &RecordBuf);

    /// Emits the fitted model alongside the given output path.
    ///
    /// # Errors
    ///
    /// Returns an error when the model cannot be written.
    fn write_model(&mut self, output: &Path) -> io::Result<()>;

    /// Rewrites the base qualities of a record about to be written.
    fn apply(&mut self, record: &mut RecordBuf);
}
