pub mod config;
pub mod environments;
pub mod external;

pub type Result<T> = anyhow::Result<T>;
