//! Physical Memory Query
//!
//! The full-collection scheduler compares resident heap size against the
//! machine's physical memory. The query may not be answerable on every
//! platform, in which case the scheduler skips its check.

/// Source of the physical memory size
pub trait PhysicalMemory: Send + Sync {
    /// Physical memory in bytes, or `None` if it cannot be determined
    fn total_bytes(&self) -> Option<u64>;
}

/// Query the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl PhysicalMemory for SystemMemory {
    fn total_bytes(&self) -> Option<u64> {
        query_total_memory()
    }
}

/// Fixed answer, for embedders that enforce their own memory budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMemory(pub Option<u64>);

impl PhysicalMemory for FixedMemory {
    fn total_bytes(&self) -> Option<u64> {
        self.0
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd"
))]
fn query_total_memory() -> Option<u64> {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let (pages, page_size) = unsafe {
        (
            libc::sysconf(libc::_SC_PHYS_PAGES),
            libc::sysconf(libc::_SC_PAGESIZE),
        )
    };
    if pages > 0 && page_size > 0 {
        return (pages as u64).checked_mul(page_size as u64);
    }
    read_meminfo()
}

#[cfg(windows)]
fn query_total_memory() -> Option<u64> {
    use windows_sys::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

    // SAFETY: MEMORYSTATUSEX is plain data; dwLength is set before the call as required.
    unsafe {
        let mut status: MEMORYSTATUSEX = std::mem::zeroed();
        status.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
        if GlobalMemoryStatusEx(&mut status) != 0 {
            Some(status.ullTotalPhys)
        } else {
            None
        }
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd",
    windows
)))]
fn query_total_memory() -> Option<u64> {
    read_meminfo()
}

#[cfg_attr(any(target_os = "macos", target_os = "freebsd", windows), allow(dead_code))]
fn read_meminfo() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

/// Extract `MemTotal` from /proc/meminfo text, in bytes
fn parse_meminfo(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_memory() {
        assert_eq!(FixedMemory(Some(4096)).total_bytes(), Some(4096));
        assert_eq!(FixedMemory(None).total_bytes(), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16318412 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_meminfo(text), Some(16318412 * 1024));
        assert_eq!(parse_meminfo("MemFree: 12 kB"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_memory_is_known_on_linux() {
        let total = SystemMemory.total_bytes().expect("linux reports physical memory");
        assert!(total > 0);
    }
}
