pub mod types;
pub mod models;
pub mod manager;
pub mod subscription;

pub use types::*;
pub use models::*;
pub use manager::*;
pub use subscription::*;
