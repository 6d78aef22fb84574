mod claims;
mod signer;

pub use claims::*;
pub use signer::*;
