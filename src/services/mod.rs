pub mod auth_service;
pub mod directory;
