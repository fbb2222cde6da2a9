pub mod cli;
pub mod discovery;
pub mod etcd;
pub mod load_config;
pub mod s3;

pub use cli::{run, Cli, Commands};
