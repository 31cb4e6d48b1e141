pub mod error;
pub mod import;
pub mod library;
pub mod merge;
pub mod model;
pub mod paths;
pub mod project;
pub mod settings;
pub mod state;
pub mod store;
pub mod validation;
