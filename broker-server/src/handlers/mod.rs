pub mod audit;
pub mod consent;
pub mod data;
pub mod health;
