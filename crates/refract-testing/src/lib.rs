//! Test support for the refract crates.
//!
//! Provides hand-assembled shader modules with line information (see
//! [`shaders`]) and a logging initializer that is safe to call from every test.

pub mod shaders;

pub use shaders::{Fixture, FIXTURE_FILE};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging for tests.
///
/// Use `RUST_LOG` to override the default filter. Repeated calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,refract_debug=debug,refract_raster=debug,refract_vm=info")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
