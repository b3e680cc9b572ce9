//! On-disk storage outside the database.

pub mod photos;

pub use photos::PhotoStore;
