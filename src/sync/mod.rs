//! Server-to-server synchronization.
//!
//! [`merge`] decides how divergent channel views reconcile, [`burst`]
//! speaks the SJOIN wire forms, and [`protocol`] routes everything a
//! peer server sends us.

pub mod burst;
pub mod merge;
pub mod protocol;
