//! Port traits implemented by adapters or by the host application.

pub mod config_port;
pub mod data_port;
pub mod host_port;
pub mod indicator_port;
pub mod variable_store_port;
