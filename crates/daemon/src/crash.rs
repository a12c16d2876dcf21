// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash handling.
//!
//! SIGSEGV and SIGABRT are caught so a core dump can be produced from
//! a forked child with default handlers, after which the supervisor
//! exits. State is assumed to be in tatters; nothing clever happens
//! here, and only async-signal-safe calls are made.

/// Install the crash handlers for SIGSEGV and SIGABRT.
pub fn install() {
    #[allow(unsafe_code)]
    unsafe {
        let handler = crash_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGSEGV, handler);
        libc::signal(libc::SIGABRT, handler);
    }
}

extern "C" fn crash_handler(signum: libc::c_int) {
    #[allow(unsafe_code)]
    unsafe {
        let pid = libc::fork();
        if pid == 0 {
            // Child: restore the default handler, lift the core limit,
            // and re-raise so the kernel writes the dump.
            let mut mask: libc::sigset_t = std::mem::zeroed();
            libc::sigfillset(&mut mask);
            libc::sigprocmask(libc::SIG_SETMASK, &mask, std::ptr::null_mut());

            libc::signal(signum, libc::SIG_DFL);

            let limit =
                libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
            libc::setrlimit(libc::RLIMIT_CORE, &limit);

            // Dump in the root directory.
            libc::chdir(b"/\0".as_ptr() as *const libc::c_char);

            libc::raise(signum);
            libc::sigdelset(&mut mask, signum);
            libc::sigprocmask(libc::SIG_SETMASK, &mask, std::ptr::null_mut());
            libc::pause();
            libc::_exit(0);
        } else if pid > 0 {
            // Parent: wait for the core to be generated, then die.
            libc::waitpid(pid, std::ptr::null_mut(), 0);
        }
        libc::_exit(signum);
    }
}
