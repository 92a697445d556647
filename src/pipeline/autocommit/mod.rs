pub mod hash;
pub mod provenance;
pub mod scoring;
pub mod gate;
pub mod plan;

pub use hash::*;
pub use provenance::*;
pub use scoring::*;
pub use gate::*;
pub use plan::*;
