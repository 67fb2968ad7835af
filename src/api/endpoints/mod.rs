pub mod adherence;
pub mod health;
pub mod medications;
