//! Windows-specific process management implementation

mod windows_process_manager;

pub use windows_process_manager::{WindowsProcessManager, WindowsTermination};

/// Windows-specific process manager factory
pub struct WindowsProcessManagerFactory;

impl nsrun_core::ProcessManagerFactory for WindowsProcessManagerFactory {
    type Manager = WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        <WindowsProcessManager as nsrun_core::ProcessManager>::new()
    }

    fn platform_name() -> &'static str {
        "Windows"
    }
}
