pub mod capabilities;
pub mod health;
