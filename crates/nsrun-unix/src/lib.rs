mod unix_process_manager;

#[cfg(unix)]
pub use unix_process_manager::{UnixProcessManager, UnixTermination};

#[cfg(unix)]
pub struct UnixProcessManagerFactory;

#[cfg(unix)]
impl nsrun_core::ProcessManagerFactory for UnixProcessManagerFactory {
    type Manager = UnixProcessManager;

    fn create_process_manager() -> Self::Manager {
        <UnixProcessManager as nsrun_core::ProcessManager>::new()
    }

    fn platform_name() -> &'static str {
        "Unix"
    }
}
