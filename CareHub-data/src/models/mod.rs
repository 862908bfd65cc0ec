// Storage models, one per collection
pub mod appointment;
pub mod billing;
pub mod blog;
pub mod lab_result;
pub mod medication;
pub mod security_event;
pub mod umid;
pub mod user;
