use nsrun_core::{ProcessManager, ProcessManagerFactory};
use std::sync::Arc;
use tracing::debug;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformProcessManagerFactory;

impl ProcessManagerFactory for PlatformProcessManagerFactory {
    #[cfg(unix)]
    type Manager = nsrun_unix::UnixProcessManager;

    #[cfg(windows)]
    type Manager = nsrun_windows::WindowsProcessManager;

    fn create_process_manager() -> Self::Manager {
        #[cfg(unix)]
        return nsrun_unix::UnixProcessManagerFactory::create_process_manager();

        #[cfg(windows)]
        return nsrun_windows::WindowsProcessManagerFactory::create_process_manager();
    }

    fn platform_name() -> &'static str {
        #[cfg(unix)]
        return nsrun_unix::UnixProcessManagerFactory::platform_name();

        #[cfg(windows)]
        return nsrun_windows::WindowsProcessManagerFactory::platform_name();
    }
}

/// Convenience function to create the process manager for this platform
pub fn create_process_manager() -> Arc<dyn ProcessManager> {
    let manager = PlatformProcessManagerFactory::create_process_manager();
    debug!(
        platform = PlatformProcessManagerFactory::platform_name(),
        "Created process manager"
    );
    Arc::new(manager)
}
