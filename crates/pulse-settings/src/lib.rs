//! # pulse-settings
//!
//! Settings are loaded from four layers (in priority order):
//! 1. **Compiled defaults**: [`PulseSettings::default()`]
//! 2. **User file**: `~/.pulse/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `PULSE_*` overrides
//! 4. **Command line**: applied by the binary after loading
//!
//! ```no_run
//! use pulse_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! for service in &settings.services {
//!     println!("{} -> {}", service.name, service.address);
//! }
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, parse_services, settings_path};
pub use types::*;
