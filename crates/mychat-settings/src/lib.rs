//! # mychat-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`ChatSettings::default()`])
//! 2. **User file** `~/.mychat/settings.json`, deep-merged over defaults
//! 3. **Environment variables** `MYCHAT_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly into the components that need it;
//! there is no process-wide settings singleton.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, data_dir, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;
