//! Graceful shutdown support via atomic flag

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, LazyLock};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Exit status after a second signal (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

static SHUTDOWN: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    &SHUTDOWN
}

/// Route SIGINT/SIGTERM to the shutdown flag.
///
/// First signal sets the flag so the collection run stops after the current
/// field. A second signal exits immediately with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [SIGTERM, SIGINT] {
        // Handlers run in registration order: the exit check must see the
        // flag before this same signal sets it.
        flag::register_conditional_shutdown(signal, FORCED_EXIT_CODE, Arc::clone(&SHUTDOWN))?;
        flag::register(signal, Arc::clone(&SHUTDOWN))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn flag_starts_clear_and_is_shared() {
        assert!(!shutdown_flag().load(Ordering::Relaxed));
        assert!(std::ptr::eq(shutdown_flag(), &**SHUTDOWN));
    }
}
