/* src/cli/core/src/config/mod.rs */

mod loader;
mod types;


pub use loader::{find_trellis_config, load_trellis_config};
pub use types::TrellisConfig;
