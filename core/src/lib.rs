pub mod analysis;
pub mod auth;
pub mod conversation;
pub mod entity;
pub mod error;
pub mod facts;
pub mod moderation;
pub mod persona;
