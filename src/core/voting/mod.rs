// Core voting module - topic proposals and deduplicated votes.

pub mod voting_models;
pub mod voting_service;

pub use voting_models::*;
pub use voting_service::*;
