pub mod keys;
pub mod settings;
pub mod types;

pub use keys::{
    DISCOVER_COMMAND, compose_group_key, short_id, task_channel, validate_operation_id,
};
pub use settings::{ProxySettings, RegistrySettings, Settings};
pub use types::*;
