//! Auth-domain token material and external identities.

pub mod identity;
pub mod token;

pub use identity::*;
pub use token::*;
