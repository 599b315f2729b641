//! Data models

pub mod features;
pub mod prediction;
pub mod principal;
pub mod token;

pub use features::*;
pub use prediction::*;
pub use principal::*;
pub use token::*;
