pub mod constants;
pub mod types;
pub mod utils;

pub use constants::*;
pub use types::*;
