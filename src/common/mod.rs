pub mod health;
pub mod response;
