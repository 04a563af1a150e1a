//! Syscall number to name mapping for aarch64 (asm-generic unistd)
//!
//! Android devices under test are arm64, so `sys_enter: NR <n>` numbers follow
//! the generic table rather than x86_64's.

/// Resolve syscall number to name for aarch64
///
/// Returns "unknown" for numbers outside the table
pub fn syscall_name(num: i64) -> &'static str {
    match num {
        17 => "getcwd",
        19 => "eventfd2",
        20 => "epoll_create1",
        21 => "epoll_ctl",
        22 => "epoll_pwait",
        23 => "dup",
        24 => "dup3",
        25 => "fcntl",
        26 => "inotify_init1",
        27 => "inotify_add_watch",
        28 => "inotify_rm_watch",
        29 => "ioctl",
        32 => "flock",
        34 => "mkdirat",
        35 => "unlinkat",
        46 => "ftruncate",
        48 => "faccessat",
        56 => "openat",
        57 => "close",
        59 => "pipe2",
        61 => "getdents64",
        62 => "lseek",
        63 => "read",
        64 => "write",
        65 => "readv",
        66 => "writev",
        67 => "pread64",
        68 => "pwrite64",
        72 => "pselect6",
        73 => "ppoll",
        74 => "signalfd4",
        78 => "readlinkat",
        79 => "newfstatat",
        80 => "fstat",
        82 => "fsync",
        83 => "fdatasync",
        85 => "timerfd_create",
        86 => "timerfd_settime",
        87 => "timerfd_gettime",
        93 => "exit",
        94 => "exit_group",
        95 => "waitid",
        96 => "set_tid_address",
        98 => "futex",
        99 => "set_robust_list",
        101 => "nanosleep",
        113 => "clock_gettime",
        115 => "clock_nanosleep",
        122 => "sched_setaffinity",
        123 => "sched_getaffinity",
        124 => "sched_yield",
        129 => "kill",
        130 => "tkill",
        131 => "tgkill",
        132 => "sigaltstack",
        134 => "rt_sigaction",
        135 => "rt_sigprocmask",
        139 => "rt_sigreturn",
        167 => "prctl",
        172 => "getpid",
        173 => "getppid",
        174 => "getuid",
        178 => "gettid",
        198 => "socket",
        199 => "socketpair",
        200 => "bind",
        201 => "listen",
        202 => "accept",
        203 => "connect",
        206 => "sendto",
        207 => "recvfrom",
        208 => "setsockopt",
        209 => "getsockopt",
        211 => "sendmsg",
        212 => "recvmsg",
        214 => "brk",
        215 => "munmap",
        216 => "mremap",
        220 => "clone",
        221 => "execve",
        222 => "mmap",
        226 => "mprotect",
        233 => "madvise",
        242 => "accept4",
        260 => "wait4",
        278 => "getrandom",
        279 => "memfd_create",
        291 => "statx",
        435 => "clone3",
        441 => "epoll_pwait2",
        _ => "unknown",
    }
}

/// Reverse lookup: syscall name to aarch64 number
pub fn syscall_number(name: &str) -> Option<i64> {
    if name == "unknown" {
        return None;
    }
    (0..=512).find(|&nr| syscall_name(nr) == name)
}

/// Label used in breakdowns: the name if known, else `syscall_<nr>`
pub fn syscall_label(num: i64) -> String {
    match syscall_name(num) {
        "unknown" => format!("syscall_{}", num),
        name => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_syscalls() {
        assert_eq!(syscall_name(22), "epoll_pwait");
        assert_eq!(syscall_name(73), "ppoll");
        assert_eq!(syscall_name(441), "epoll_pwait2");
    }

    #[test]
    fn test_io_syscalls() {
        assert_eq!(syscall_name(63), "read");
        assert_eq!(syscall_name(64), "write");
        assert_eq!(syscall_name(56), "openat");
    }

    #[test]
    fn test_unknown_syscall() {
        assert_eq!(syscall_name(9999), "unknown");
        assert_eq!(syscall_name(-1), "unknown");
        assert_eq!(syscall_label(460), "syscall_460");
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(syscall_number("epoll_pwait"), Some(22));
        assert_eq!(syscall_number("read"), Some(63));
        assert_eq!(syscall_number("not_a_syscall"), None);
        assert_eq!(syscall_number("unknown"), None);
    }
}
