pub mod build_model;
pub mod config;
pub mod info;
pub mod run;
pub mod validate;
