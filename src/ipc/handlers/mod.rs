pub mod assignment;
pub mod catalog;
pub mod core;
pub mod enrollments;
pub mod grades;
pub mod rules;
pub mod setup;
pub mod transcript;
