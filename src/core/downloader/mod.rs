pub mod client;
pub mod queue;

pub use client::{sha1_hex, DownloadEntry, Downloader};
pub use queue::{QueuePolicy, TaskQueue};
