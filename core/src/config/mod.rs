mod load;
mod types;

pub use load::{apply_env_overrides, get_tribridge_data_dir, load_default, load_from_path};
pub use types::{
    AiStudioConfig, AppConfig, BackendsConfig, CodeCliConfig, LoggingConfig, RouterConfig,
};
