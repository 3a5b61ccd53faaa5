pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod options;

pub use config::Config;
pub use data::*;
pub use error::*;
pub use format::*;
pub use options::*;
