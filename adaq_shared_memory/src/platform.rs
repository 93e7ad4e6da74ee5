//! Platform-specific mapping and process helpers

pub mod linux;

pub use linux::{attach_channel_mmap, create_channel_mmap, get_current_pid, is_process_alive};
