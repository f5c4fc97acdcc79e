//! Signal dispositions while the launcher waits on its child
//!
//! SIGINT and SIGQUIT from the terminal reach the whole foreground process
//! group, so the child already receives them. The launcher ignores them and
//! reports whatever the child ends up doing. SIGTERM is addressed to the
//! launcher alone and is forwarded to the child.
//!
//! The guard is installed after the child is spawned, so the child starts
//! with the dispositions the launcher inherited.

#[cfg(unix)]
mod imp {
    use nix::libc::c_int;
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use nix::unistd::Pid;
    use std::sync::atomic::{AtomicI32, Ordering};

    static CHILD_PID: AtomicI32 = AtomicI32::new(0);

    extern "C" fn forward(sig: c_int) {
        let pid = CHILD_PID.load(Ordering::SeqCst);
        if pid > 0 {
            if let Ok(sig) = Signal::try_from(sig) {
                let _ = signal::kill(Pid::from_raw(pid), sig);
            }
        }
    }

    /// Restores the previous dispositions when dropped
    pub struct SignalGuard {
        saved: Vec<(Signal, SigAction)>,
    }

    impl SignalGuard {
        /// Ignore SIGINT/SIGQUIT and forward SIGTERM to `child_pid`
        pub fn install(child_pid: u32) -> std::io::Result<Self> {
            let pid = i32::try_from(child_pid)
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
            CHILD_PID.store(pid, Ordering::SeqCst);

            let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
            let relay = SigAction::new(SigHandler::Handler(forward), SaFlags::SA_RESTART, SigSet::empty());

            let mut guard = Self {
                saved: Vec::with_capacity(3),
            };
            for (sig, action) in [
                (Signal::SIGINT, &ignore),
                (Signal::SIGQUIT, &ignore),
                (Signal::SIGTERM, &relay),
            ] {
                // SAFETY: the only handler installed is `forward`, which
                // reads an atomic and calls kill(2), both async-signal-safe.
                let old = unsafe { signal::sigaction(sig, action) }.map_err(std::io::Error::from)?;
                guard.saved.push((sig, old));
            }

            Ok(guard)
        }
    }

    impl Drop for SignalGuard {
        fn drop(&mut self) {
            for (sig, old) in self.saved.drain(..).rev() {
                // SAFETY: restores a disposition previously returned by sigaction
                let _ = unsafe { signal::sigaction(sig, &old) };
            }
            CHILD_PID.store(0, Ordering::SeqCst);
        }
    }
}

#[cfg(not(unix))]
mod imp {
    /// No-op on platforms without POSIX signals
    pub struct SignalGuard;

    impl SignalGuard {
        /// No-op on platforms without POSIX signals
        pub fn install(_child_pid: u32) -> std::io::Result<Self> {
            Ok(Self)
        }
    }
}

pub use imp::SignalGuard;
