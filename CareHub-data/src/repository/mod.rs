// Repository module structure
pub mod errors;
mod collection;
mod subscription;

// Re-export commonly used types
pub use errors::RepositoryError;
pub use collection::{Collection, Entity, Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use subscription::{Change, Subscription};

#[cfg(feature = "with-api")]
pub use collection::{AppointmentPage, BillPage, BlogPostPage, LabResultPage, UserPage};
