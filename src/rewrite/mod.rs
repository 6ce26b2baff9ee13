//! Applying resolutions back into bibliographic journal fields.
//!
//! Each [`FieldText`](pass::FieldText) is resolved against one catalog snapshot
//! and, when the match is confident enough and the record carries the requested
//! abbreviation, its text is replaced. A surrounding `{...}` wrapper is kept:
//!
//! | Input                                | Output               | Status      |
//! |--------------------------------------|----------------------|-------------|
//! | `{The Journal of Chemical Physics}`  | `{J. Chem. Phys.}`   | rewritten   |
//! | `J. Chem. Phys.`                     | `J. Chem. Phys.`     | unchanged   |
//! | `Zoology Quarterly`                  | `Zoology Quarterly`  | unresolved  |
//!
//! The pass only reads the snapshot, so it can run while the store accepts
//! writes, and a cancelled run leaves nothing to clean up.

pub mod pass;

pub use pass::{FieldText, RewriteConfig, RewritePass, RewriteReport, RewriteStatus};
