//! Tracing subscriber set-up for test binaries.

use tracing::Level;
use tracing_subscriber::fmt;

/// Install a formatting subscriber at `DEBUG` when `verbose`, else `WARN`.
///
/// Returns `false` when another subscriber was already installed, so calling
/// this from several tests is harmless.
#[must_use]
pub fn init(verbose: bool) -> bool {
    let max_level = if verbose { Level::DEBUG } else { Level::WARN };
    fmt()
        .with_max_level(max_level)
        .with_test_writer()
        .try_init()
        .is_ok()
}
