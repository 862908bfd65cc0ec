// CareHub-api lib.rs
//
// HTTP layer for CareHub: router, handlers, public request/response
// entities and the OpenAPI document.

// Public modules
pub mod api;
pub mod entities;
pub mod openapi;

pub use api::{create_application, AppState};
