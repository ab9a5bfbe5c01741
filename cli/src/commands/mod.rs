pub mod chat;
pub mod classify;
pub mod health;
pub mod login;
pub mod routes;
pub mod say;
