//! Input validation helpers shared by the merge engine and the CLI.

pub mod validation;
