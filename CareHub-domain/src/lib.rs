// CareHub Domain
// This crate contains the business logic for the CareHub application

// Runtime configuration
pub mod config;

// Security event logging
pub mod audit;

// Authentication and authorization
pub mod auth;

// Services that implement business logic
pub mod services;

// Health checks and system status
pub mod health;

// Re-export the data crate modules for convenience
pub use care_hub_data::{database, media, models, repository, store};

// Testing utilities - only available with mock feature
#[cfg(feature = "mock")]
pub mod testing;
