//! Documents persisted by the license store.

mod license;
mod machine;
mod trial;

pub use license::*;
pub use machine::*;
pub use trial::*;
