// Core moderation module - decides which channel messages are admitted.

pub mod moderation_models;
pub mod moderation_service;
pub mod rate_window;
pub mod spam_classifier;

pub use moderation_models::*;
pub use moderation_service::*;
