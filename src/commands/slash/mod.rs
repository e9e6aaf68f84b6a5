pub mod admin;
pub mod tickets;
