//! Process hardening and privilege checks.
//!
//! The admin token exists in plaintext in this process for the duration of
//! one prompt. [`disable_core_dumps`] makes sure a crash during that window
//! cannot write it to a core file. Both helpers are no-ops (or report
//! "unprivileged") off Unix.

/// Set `RLIMIT_CORE` to zero for this process.
///
/// Call before any secret is generated.
///
/// # Errors
///
/// Returns a description of the OS error if `setrlimit` fails.
#[cfg(unix)]
pub fn disable_core_dumps() -> Result<(), String> {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `setrlimit` only reads the struct we pass by reference, which is
    // fully initialised and lives for the duration of the call.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };

    if rc == 0 {
        Ok(())
    } else {
        Err(format!(
            "setrlimit(RLIMIT_CORE, 0): {}",
            std::io::Error::last_os_error()
        ))
    }
}

#[cfg(not(unix))]
pub fn disable_core_dumps() -> Result<(), String> {
    Ok(())
}

/// Whether the process runs with an effective uid of 0.
///
/// Package installation is prefixed with `sudo` when this is false.
#[cfg(unix)]
#[must_use]
pub fn is_privileged() -> bool {
    // SAFETY: `geteuid` takes no arguments, cannot fail, and touches no
    // memory owned by Rust.
    #[allow(unsafe_code)]
    let euid = unsafe { libc::geteuid() };
    euid == 0
}

#[cfg(not(unix))]
#[must_use]
pub fn is_privileged() -> bool {
    false
}
