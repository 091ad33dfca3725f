pub mod config;
pub mod submit;
