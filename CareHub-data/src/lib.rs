// CareHub Data
// This crate handles document storage and external service interactions

// Database connection management
pub mod database;

// Document store abstraction and implementations
pub mod store;

// Typed repositories over the document store
pub mod repository;

// Data storage models
pub mod models;

// Image hosting clients
pub mod media;

pub use repository::{Collection, Entity, Page, PageRequest, RepositoryError};
pub use store::{DocumentStore, Query};
