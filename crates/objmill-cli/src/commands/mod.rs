pub mod build;
pub mod clean;
pub mod redep;
pub mod variants;
