pub mod albums;
pub mod auth;
pub mod error;
pub mod locks;
pub mod ownership;
pub mod photos;
pub mod pipeline;
