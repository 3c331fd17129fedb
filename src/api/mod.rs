//! mod `api` initializes the runtime shared by the primitives. There are three ways:
//!
//!  1. `init_default()`, using the environment and the default config.
//!  2. `init_with_config(config_entity: ConfigEntity)`, using a customized config entity.
//!  3. `init_with_config_file(config_path: &mut String)`, using a yaml file.
//!
//! The primitives work without initialization too, with the default config
//! and without the background cpu collector, so the shedder never sees any cpu load.

mod init;

pub use init::*;
