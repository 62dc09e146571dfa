//! Microsegment addressing and the per-key result tree.

pub mod categories;
pub mod key;
pub mod streams;
pub mod value;
