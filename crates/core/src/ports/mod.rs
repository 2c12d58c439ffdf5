//! Port interfaces implemented by the infrastructure layer.

pub mod stores;
pub mod upstream;

pub use stores::*;
pub use upstream::*;
