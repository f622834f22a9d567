//! Scoped read-only memory maps over shard files.
//!
//! A [`ShardMap`] is the only way this crate touches shard bytes. It is
//! released on drop, including on early returns and panics during a scan,
//! and on unix asks the kernel to drop the cached pages before unmapping so
//! resident memory tracks the shard being read and not the shards already
//! passed.

use std::fs::File;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::catalog::{ShardDescriptor, BYTES_PER_ELEMENT};
use crate::error::{Error, Result};

#[cfg(target_endian = "big")]
compile_error!("shard files are little-endian f32; big-endian hosts are not supported");

/// Counters shared by every map opened through one reader.
///
/// `peak_open` is the high-water mark of simultaneously open maps; the
/// streaming and materialisation paths keep it at 1.
#[derive(Debug, Default)]
pub struct MapStats {
    open: AtomicUsize,
    peak_open: AtomicUsize,
    total_opened: AtomicUsize,
}

impl MapStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::Acquire)
    }

    pub fn total_opened(&self) -> usize {
        self.total_opened.load(Ordering::Acquire)
    }

    fn on_open(&self) {
        let now = self.open.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_open.fetch_max(now, Ordering::AcqRel);
        self.total_opened.fetch_add(1, Ordering::AcqRel);
    }

    fn on_release(&self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A mapped shard, viewed as `count * dim` f32 values.
pub struct ShardMap {
    mmap: Mmap,
    dim: usize,
    count: u64,
    shard_path: std::path::PathBuf,
    stats: Arc<MapStats>,
}

impl ShardMap {
    /// Map `shard`, checking that its on-disk length still matches the
    /// catalog.
    ///
    /// Callers must not open zero-row shards; mapping an empty file is an
    /// error on most platforms.
    pub fn open(shard: &ShardDescriptor, dim: usize, stats: &Arc<MapStats>) -> Result<Self> {
        let expected = shard.count * dim as u64 * BYTES_PER_ELEMENT;
        let file = File::open(&shard.path).map_err(|e| Error::io(&shard.path, e))?;
        let actual = file
            .metadata()
            .map_err(|e| Error::io(&shard.path, e))?
            .len();
        if actual != expected {
            return Err(Error::corrupt_shard(
                &shard.path,
                format!(
                    "length {} bytes, catalog expects {} rows x {} dims = {} bytes",
                    actual, shard.count, dim, expected
                ),
            ));
        }
        if expected == 0 {
            return Err(Error::InvalidArgument(format!(
                "refusing to map empty shard {}",
                shard.path.display()
            )));
        }

        // SAFETY: shard files are read-only inputs for the whole run; nothing
        // in this process writes to them while mapped.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::io(&shard.path, e))?;

        #[cfg(unix)]
        {
            if let Err(e) = mmap.advise(memmap2::Advice::Sequential) {
                tracing::debug!(path = %shard.path.display(), error = %e, "madvise(SEQUENTIAL) failed");
            }
        }

        stats.on_open();
        tracing::debug!(
            path = %shard.path.display(),
            rows = shard.count,
            open = stats.open(),
            "mapped shard"
        );

        Ok(Self {
            mmap,
            dim,
            count: shard.count,
            shard_path: shard.path.clone(),
            stats: Arc::clone(stats),
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All values of the shard, row-major.
    pub fn as_f32(&self) -> Result<&[f32]> {
        bytemuck::try_cast_slice(&self.mmap[..])
            .map_err(|e| Error::corrupt_shard(&self.shard_path, format!("cannot view as f32: {:?}", e)))
    }

    /// Local rows `range` as a flat slice of `range.len() * dim` values.
    pub fn rows(&self, range: Range<u64>) -> Result<&[f32]> {
        if range.start > range.end || range.end > self.count {
            return Err(Error::InvalidArgument(format!(
                "row range {:?} outside shard of {} rows",
                range, self.count
            )));
        }
        let all = self.as_f32()?;
        let start = range.start as usize * self.dim;
        let end = range.end as usize * self.dim;
        Ok(&all[start..end])
    }

    /// One local row.
    pub fn row(&self, local: u64) -> Result<&[f32]> {
        self.rows(local..local + 1)
    }
}

impl Drop for ShardMap {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            // SAFETY: the map is read-only and private to this struct; no
            // slice borrowed from it can outlive `self`, so discarding the
            // cached pages cannot be observed.
            let advised = unsafe { self.mmap.unchecked_advise(memmap2::UncheckedAdvice::DontNeed) };
            if let Err(e) = advised {
                tracing::debug!(path = %self.shard_path.display(), error = %e, "madvise(DONTNEED) failed");
            }
        }
        self.stats.on_release();
        tracing::debug!(path = %self.shard_path.display(), "released shard map");
    }
}
