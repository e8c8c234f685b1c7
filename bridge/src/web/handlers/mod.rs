//! HTTP request handlers, organized by domain:
//! - `appliances` - state, refresh, entities, removal and diagnostics
//! - `fan` - fan policy, curve and monitor interval controls
//! - `actions` - backup tasks and appliance power actions

pub mod actions;
pub mod appliances;
pub mod common;
pub mod fan;

pub use actions::*;
pub use appliances::*;
pub use fan::*;
