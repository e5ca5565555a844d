//! Hook definitions and discovery
//!
//! ## Module Organization
//!
//! - `descriptor`: static hook metadata used for scheduling
//! - `registry`: validated set of descriptors with their bodies
//! - `loader`: hook discovery from TOML files and change detection
//! - `command`: hooks backed by external processes

pub mod command;
pub mod descriptor;
pub mod loader;
pub mod registry;

pub use command::{CommandHook, DuctProcess, parse_command};
pub use descriptor::HookDescriptor;
pub use loader::{HookLoader, HookSpec, LoadedHook, RegistryWatcher};
pub use registry::{HookRegistry, HookRegistryBuilder, RegisteredHook};
