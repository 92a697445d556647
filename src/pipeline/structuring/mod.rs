pub mod types;
pub mod classify;
pub mod hints;
pub mod mapper;

pub use types::*;
pub use classify::*;
pub use hints::*;
pub use mapper::*;
