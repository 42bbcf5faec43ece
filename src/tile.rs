//! Local tile storage
//!
//! Each worker owns one dense, row-major tile holding its cyclically assigned
//! blocks. Tile memory is addressed through raw `u64` handles so that
//! accelerator operations executing on dispatcher worker threads can write
//! disjoint blocks concurrently; the dispatcher's declared-dependency graph is
//! what keeps two operations from ever touching the same block at once.

use crate::config::LuConfig;
use crate::element::Element;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A borrowed `B x B` window into tile or panel memory.
///
/// `ptr` addresses the first element; consecutive rows are `stride` elements
/// apart. For panel buffers the stride equals the block side length. The
/// element type is carried so kernel calls stay fully inferable.
pub struct BlockView<T> {
    /// Device handle of the first element
    pub ptr: u64,
    /// Elements between consecutive rows
    pub stride: usize,
    _marker: PhantomData<T>,
}

impl<T> BlockView<T> {
    /// View over memory starting at `ptr` with `stride` elements per row
    pub fn new(ptr: u64, stride: usize) -> Self {
        Self {
            ptr,
            stride,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for BlockView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BlockView<T> {}

impl<T> fmt::Debug for BlockView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockView")
            .field("ptr", &self.ptr)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Fixed-size, 64-byte-aligned, zero-initialized buffer.
///
/// The alignment matches what vectorized kernels expect; zero init makes a
/// freshly allocated tile a valid (if uninteresting) matrix.
pub struct AlignedBuf<T> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<T>,
}

// One owner mutates; concurrent access goes through raw handles whose
// disjointness is the dispatcher's responsibility.
unsafe impl<T: Send> Send for AlignedBuf<T> {}
unsafe impl<T: Sync> Sync for AlignedBuf<T> {}

const ALIGN: usize = 64;

impl<T: Element> AlignedBuf<T> {
    /// Allocate `len` zeroed elements
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "zero-length buffer");
        let layout = Layout::from_size_align(len * std::mem::size_of::<T>(), ALIGN)
            .expect("invalid allocation layout");
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).expect("out of memory");
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer holds no elements (never, by construction)
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw handle to the first element
    pub fn handle(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// View the buffer as a slice
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for AlignedBuf<T> {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len * std::mem::size_of::<T>(), ALIGN)
            .expect("invalid allocation layout");
        unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
    }
}

/// One worker's share of the global matrix: `rows x cols` elements, row-major.
pub struct LocalTile<T> {
    buf: AlignedBuf<T>,
    rows: usize,
    cols: usize,
    block_size: usize,
}

impl<T> fmt::Debug for LocalTile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTile")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

impl<T: Element> LocalTile<T> {
    /// Allocate a zeroed tile sized for one worker of `cfg`
    pub fn new(cfg: &LuConfig) -> Self {
        Self {
            buf: AlignedBuf::new(cfg.local_rows() * cfg.local_cols()),
            rows: cfg.local_rows(),
            cols: cfg.local_cols(),
            block_size: cfg.block_size,
        }
    }

    /// Build a tile from existing row-major data
    pub fn from_slice(data: &[T], rows: usize, cols: usize, block_size: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "tile shape mismatch");
        let mut buf = AlignedBuf::new(rows * cols);
        buf.as_mut_slice().copy_from_slice(data);
        Self {
            buf,
            rows,
            cols,
            block_size,
        }
    }

    /// Element rows of the tile
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Element columns of the tile
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Side length of one block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The tile contents as a row-major slice
    pub fn as_slice(&self) -> &[T] {
        self.buf.as_slice()
    }

    /// The tile contents as a mutable row-major slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.buf.as_mut_slice()
    }

    fn block_offset(&self, local_row: usize, local_col: usize) -> usize {
        debug_assert!(local_row * self.block_size < self.rows);
        debug_assert!(local_col * self.block_size < self.cols);
        local_row * self.block_size * self.cols + local_col * self.block_size
    }

    /// Raw view of local block `(local_row, local_col)`
    pub fn block_view(&self, local_row: usize, local_col: usize) -> BlockView<T> {
        let offset = self.block_offset(local_row, local_col);
        BlockView::new(
            self.buf.handle() + (offset * std::mem::size_of::<T>()) as u64,
            self.cols,
        )
    }

    /// Copy local block `(local_row, local_col)` into a contiguous `B x B` buffer
    pub fn copy_block_out(&self, local_row: usize, local_col: usize, out: &mut [T]) {
        let b = self.block_size;
        debug_assert_eq!(out.len(), b * b);
        let offset = self.block_offset(local_row, local_col);
        let src = self.as_slice();
        for i in 0..b {
            out[i * b..(i + 1) * b]
                .copy_from_slice(&src[offset + i * self.cols..offset + i * self.cols + b]);
        }
    }

    /// Overwrite local block `(local_row, local_col)` from a contiguous buffer
    pub fn copy_block_in(&mut self, local_row: usize, local_col: usize, data: &[T]) {
        let b = self.block_size;
        debug_assert_eq!(data.len(), b * b);
        let offset = self.block_offset(local_row, local_col);
        let cols = self.cols;
        let dst = self.as_mut_slice();
        for i in 0..b {
            dst[offset + i * cols..offset + i * cols + b]
                .copy_from_slice(&data[i * b..(i + 1) * b]);
        }
    }
}
