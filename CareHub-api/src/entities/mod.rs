// Public entities for the CareHub API
// Request and response shapes owned by the HTTP layer; service request types
// and storage models are used directly where they already fit.

// Pagination and list parameters
pub mod common;

// Image upload payloads
pub mod media;
