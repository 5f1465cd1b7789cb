pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod login;
pub mod missions;
pub mod points;
pub mod students;
