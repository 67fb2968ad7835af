pub mod adherence;
pub mod medication;

pub use adherence::*;
pub use medication::*;
