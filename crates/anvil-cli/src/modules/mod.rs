//! Modules shipped with the `anvil` binary.

pub mod console;
pub mod heartbeat;

use anvil_kernel::ModuleSource;

/// The declared module list, in initialization order.
pub fn declared() -> Vec<ModuleSource> {
    vec![
        ModuleSource::from_module(heartbeat::Heartbeat),
        ModuleSource::from_module(console::Console),
    ]
}
