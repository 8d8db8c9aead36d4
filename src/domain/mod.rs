pub mod insights;
pub mod models;
pub mod status;
pub mod timer;
pub mod validation;
