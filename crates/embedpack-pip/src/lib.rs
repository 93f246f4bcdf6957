//! Package-manager bootstrap for a freshly extracted embeddable runtime:
//! strategy selection per target release, offline patching of the bootstrap
//! script for releases its self-upgrade no longer supports, and the smoke
//! invocations of the built interpreter.

mod bootstrap;
mod smoke;

pub use bootstrap::{BootstrapError, BootstrapStrategy, ensure_package_manager};
pub use smoke::{SmokeError, interpreter_path, smoke_test_pip, smoke_test_runtime};
