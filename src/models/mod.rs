pub mod enums;
pub mod handover;
pub mod shift;

pub use enums::*;
pub use handover::*;
pub use shift::*;
