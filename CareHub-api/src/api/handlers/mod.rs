pub mod admin;
pub mod appointments;
pub mod billing;
pub mod blog;
pub mod doctors;
pub mod health;
pub mod lab_results;
pub mod media;
pub mod medications;
pub mod profile;
pub mod umid;

pub use health::health_check;
