use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SIGINT_TRIPPED: AtomicBool = AtomicBool::new(false);

extern "C" fn record_sigint(_signum: libc::c_int) {
    SIGINT_TRIPPED.store(true, Ordering::SeqCst);
}

/// Cancellation token passed through every orchestrated stage.
///
/// The task engine polls it between admissions; nothing ever preempts a
/// running child. A token can be tripped programmatically, and a token
/// obtained through `arm` additionally observes SIGINT for as long as the
/// handler stays installed.
#[derive(Clone)]
pub struct Interrupt {
    local: Arc<AtomicBool>,
    sigint: bool,
}

impl Interrupt {
    /// A token that only trips programmatically
    pub fn new() -> Interrupt {
        Interrupt {
            local: Arc::new(AtomicBool::new(false)),
            sigint: false,
        }
    }

    /// Install the SIGINT handler and hand out a token observing it.
    ///
    /// Must be paired with `disarm` so that the user can abort cleanly
    /// between orchestrated stages.
    pub fn arm() -> Interrupt {
        SIGINT_TRIPPED.store(false, Ordering::SeqCst);
        unsafe {
            libc::signal(libc::SIGINT, record_sigint as libc::sighandler_t);
        }
        Interrupt {
            local: Arc::new(AtomicBool::new(false)),
            sigint: true,
        }
    }

    /// Restore default SIGINT behaviour
    pub fn disarm(&self) {
        if self.sigint {
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
        }
    }

    pub fn trip(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.local.load(Ordering::SeqCst) || (self.sigint && SIGINT_TRIPPED.load(Ordering::SeqCst))
    }
}

impl Default for Interrupt {
    fn default() -> Interrupt {
        Interrupt::new()
    }
}
