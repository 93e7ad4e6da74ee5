//! Linux-specific shared memory operations

use crate::error::ShmResult;
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Create (or truncate) a channel file of `size` bytes and map it.
///
/// The file is zero-filled by `set_len`, so every slot starts free.
pub fn create_channel_mmap(path: &Path, size: usize) -> ShmResult<MmapMut> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .mode(0o660)
        .open(path)?;

    file.set_len(size as u64)?;

    // SAFETY: the mapping is shared with other processes; all concurrent
    // access goes through atomics in the ring channel protocol.
    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}

/// Map an existing channel file.
pub fn attach_channel_mmap(path: &Path) -> ShmResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    // SAFETY: see `create_channel_mmap`.
    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false,
        Err(nix::Error::EPERM) => true,
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
