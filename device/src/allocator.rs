//! Host memory standing in for device memory.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::{OptionExt, ensure};

use crate::backend::BufferHandle;
use crate::error::{OutOfBoundsSnafu, Result, UnknownBufferSnafu};

/// Zeroed bytes backed by 8-byte words, so any packed element type the
/// kernel casts the base pointer to is sufficiently aligned.
#[derive(Debug)]
pub struct HostBuffer {
    words: Box<[u64]>,
    len: usize,
}

impl HostBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self { words: vec![0u64; len.div_ceil(8)].into_boxed_slice(), len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `len` initialized bytes and u8 has no
        // alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, with the unique borrow of `self`.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.words.as_mut_ptr().cast()
    }
}

/// Table of live host buffers keyed by handle.
#[derive(Debug, Default)]
pub struct HostAllocator {
    buffers: Mutex<HashMap<BufferHandle, HostBuffer>>,
    next_id: AtomicU64,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&self, size: usize) -> BufferHandle {
        let handle = BufferHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(handle, HostBuffer::zeroed(size));
        handle
    }

    pub fn upload(&self, bytes: &[u8]) -> BufferHandle {
        let mut buffer = HostBuffer::zeroed(bytes.len());
        buffer.bytes_mut().copy_from_slice(bytes);
        let handle = BufferHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(handle, buffer);
        handle
    }

    pub fn read(&self, handle: BufferHandle, size: usize) -> Result<Vec<u8>> {
        let buffers = self.buffers.lock();
        let buffer = buffers.get(&handle).context(UnknownBufferSnafu { handle })?;
        ensure!(size <= buffer.len(), OutOfBoundsSnafu { handle, requested: size, size: buffer.len() });
        Ok(buffer.bytes()[..size].to_vec())
    }

    pub fn free(&self, handle: BufferHandle) -> Result<()> {
        self.buffers.lock().remove(&handle).map(drop).context(UnknownBufferSnafu { handle })
    }

    pub fn live(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Run `f` with the base pointer of every buffer in `handles`, holding
    /// the table lock for the duration so no buffer moves or disappears.
    pub fn with_pointers<R>(&self, handles: &[BufferHandle], f: impl FnOnce(&[*mut c_void]) -> R) -> Result<R> {
        let mut buffers = self.buffers.lock();
        let mut pointers = Vec::with_capacity(handles.len());
        for &handle in handles {
            let buffer = buffers.get_mut(&handle).context(UnknownBufferSnafu { handle })?;
            pointers.push(buffer.as_mut_ptr());
        }
        Ok(f(&pointers))
    }
}
