//! generation-service: relays image generation requests to fal.ai and
//! charges the requesting user for each completed image.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
