pub mod analysis;
pub mod audio;
pub mod chat;
pub mod discover;
pub mod health;
pub mod session;
pub mod upload;
