//! Shared, reference-counted file descriptor.
//!
//! One archive descriptor is shared by the archive handle and every open
//! entry stream. Each consumer holds an [`FdGuard`]; cloning a guard
//! increments the count and dropping one decrements it, so the descriptor is
//! closed exactly once, when the last consumer releases it. Scoped guards
//! make an unbalanced release unrepresentable.
//!
//! OS-level reads are serialized through the interior lock, so overlapping
//! logical requests never race on the shared descriptor.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::ReadAt;

struct Inner {
    /// `None` once the descriptor has been closed. The lock doubles as the
    /// single-concurrency queue for positional reads.
    file: Mutex<Option<File>>,
    refs: AtomicUsize,
    size: u64,
}

impl Inner {
    fn lock_file(&self) -> MutexGuard<'_, Option<File>> {
        // a poisoned lock only means another reader panicked; the slot
        // itself is still usable
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// An open file whose lifetime is governed by guard reference counting.
pub struct SharedFd {
    inner: Arc<Inner>,
}

impl SharedFd {
    /// Open a file for shared random access.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Inner {
                file: Mutex::new(Some(file)),
                refs: AtomicUsize::new(0),
                size,
            }),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// Take a reference to the descriptor.
    ///
    /// The descriptor stays open for as long as at least one guard is alive,
    /// even if this `SharedFd` is dropped first.
    pub fn acquire(&self) -> FdGuard {
        self.inner.refs.fetch_add(1, Ordering::SeqCst);
        FdGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A scoped reference to a [`SharedFd`].
pub struct FdGuard {
    inner: Arc<Inner>,
}

impl Clone for FdGuard {
    fn clone(&self) -> Self {
        self.inner.refs.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        let previous = self.inner.refs.fetch_sub(1, Ordering::SeqCst);
        assert!(previous > 0, "descriptor reference count underflow");
        if previous == 1 {
            // last consumer: close the descriptor
            *self.inner.lock_file() = None;
        }
    }
}

#[async_trait]
impl ReadAt for FdGuard {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let slot = self.inner.lock_file();
        let file = slot
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "file is closed"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            file.read_at(buf, offset)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            file.seek_read(buf, offset)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file: &File = file;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }

    fn size(&self) -> u64 {
        self.inner.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_read_at() {
        let file = fixture_file(b"0123456789");
        let fd = SharedFd::open(file.path()).unwrap();
        assert_eq!(fd.size(), 10);

        let guard = fd.acquire();
        let mut buf = [0u8; 4];
        crate::io::read_exact_at(&guard, 3, &mut buf).await.unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[tokio::test]
    async fn test_closes_after_last_guard() {
        let file = fixture_file(b"data");
        let fd = SharedFd::open(file.path()).unwrap();

        let first = fd.acquire();
        let second = first.clone();
        drop(fd);
        drop(first);

        // still open: `second` holds a reference
        let mut buf = [0u8; 4];
        second.read_at(0, &mut buf).await.unwrap();
        assert_eq!(&buf, b"data");

        let reopened = second.clone();
        drop(second);
        reopened.read_at(0, &mut buf).await.unwrap();
        drop(reopened);
        // all guards gone; nothing left to observe the closed descriptor,
        // which is the point of the RAII design
    }

    #[tokio::test]
    async fn test_read_past_close_fails() {
        let file = fixture_file(b"data");
        let fd = SharedFd::open(file.path()).unwrap();
        let guard = fd.acquire();
        {
            let other = fd.acquire();
            drop(other);
        }
        drop(guard);

        // a fresh guard from the already-closed descriptor reads nothing
        let guard = fd.acquire();
        let mut buf = [0u8; 4];
        let err = guard.read_at(0, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
