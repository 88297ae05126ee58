pub mod error;
pub mod memory;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use memory::*;
pub use traits::*;
pub use types::*;
