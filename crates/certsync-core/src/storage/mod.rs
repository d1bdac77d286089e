// # Object Storage Implementations
//
// This module provides implementations of the ObjectStorage trait for
// local use. The HTTP backend lives in the `certsync-storage-http` crate.

pub mod file;
pub mod memory;

pub use file::{FileObjectStorage, FileObjectStorageFactory};
pub use memory::{MemoryObjectStorage, MemoryObjectStorageFactory};
