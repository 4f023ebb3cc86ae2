mod delta;
mod entity;
mod error;
mod topic;

pub use delta::*;
pub use entity::*;
pub use error::*;
pub use topic::*;
