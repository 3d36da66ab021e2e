//! Stream guards: caller streams instrumented to report their close.
//!
//! Closing a guard, explicitly or by dropping it, is how the lock table
//! learns that a read or write actually happened. A guard holds only a weak
//! reference to the table; if the manager is gone, closing does nothing.

use super::access::AccessId;
use super::table::{Authorized, LockTable};
use crate::resource::ResourceKey;
use log::warn;
use std::io::{self, Read, Write};
use std::sync::{Mutex, Weak};

/// Direction of a guarded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Read,
    Write,
}

/// The guard's link back to the table.
#[derive(Debug)]
struct GuardLink {
    table: Weak<Mutex<LockTable>>,
    access: AccessId,
    authorized: Authorized,
    kind: GuardKind,
    open: bool,
}

impl GuardLink {
    fn close(&mut self, completed: bool) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(table) = self.table.upgrade() {
            LockTable::lock(&table).close_guard(self.access, &self.authorized, self.kind, completed);
        }
    }
}

/// A read stream whose close advances the lock state.
#[derive(Debug)]
pub struct ReadGuard<R: Read> {
    inner: Option<R>,
    link: GuardLink,
}

impl<R: Read> ReadGuard<R> {
    pub(crate) fn new(inner: R, table: Weak<Mutex<LockTable>>, access: AccessId, authorized: Authorized) -> Self {
        Self {
            inner: Some(inner),
            link: GuardLink {
                table,
                access,
                authorized,
                kind: GuardKind::Read,
                open: true,
            },
        }
    }

    /// The locked resource this stream reads.
    pub fn resource(&self) -> &ResourceKey {
        &self.link.authorized.resource
    }

    /// What is actually read: the resource or its immutable-read copy.
    pub fn target(&self) -> &ResourceKey {
        &self.link.authorized.target
    }

    pub fn get_ref(&self) -> Option<&R> {
        self.inner.as_ref()
    }

    /// Close the stream and report the finished read.
    pub fn close(mut self) {
        drop(self.inner.take());
        self.link.close(true);
    }
}

impl<R: Read> Read for ReadGuard<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Err(io::Error::other("stream guard already closed")),
        }
    }
}

impl<R: Read> Drop for ReadGuard<R> {
    fn drop(&mut self) {
        drop(self.inner.take());
        self.link.close(true);
    }
}

/// A write stream whose close advances the lock state.
#[derive(Debug)]
pub struct WriteGuard<W: Write> {
    inner: Option<W>,
    link: GuardLink,
}

impl<W: Write> WriteGuard<W> {
    pub(crate) fn new(inner: W, table: Weak<Mutex<LockTable>>, access: AccessId, authorized: Authorized) -> Self {
        Self {
            inner: Some(inner),
            link: GuardLink {
                table,
                access,
                authorized,
                kind: GuardKind::Write,
                open: true,
            },
        }
    }

    /// The locked resource this stream writes.
    pub fn resource(&self) -> &ResourceKey {
        &self.link.authorized.resource
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    /// Flush, close the stream, and report the finished write.
    ///
    /// If flushing fails the guard is still closed and the error returned;
    /// a write-once upgrade is then not consumed.
    pub fn close(mut self) -> io::Result<()> {
        let flushed = self.flush_and_drop();
        self.link.close(flushed.is_ok());
        flushed
    }

    fn flush_and_drop(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Write for WriteGuard<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.write(buf),
            None => Err(io::Error::other("stream guard already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for WriteGuard<W> {
    fn drop(&mut self) {
        if !self.link.open {
            return;
        }
        let flushed = self.flush_and_drop();
        if let Err(e) = &flushed {
            warn!(
                "failed to flush write stream on {}: {}",
                self.link.authorized.resource, e
            );
        }
        self.link.close(flushed.is_ok());
    }
}
