// SPDX-License-Identifier: Apache-2.0 OR MIT

//! POSIX shared memory segment management: safe wrappers around
//! `shm_open`, `ftruncate`, and `mmap` for creating and mapping the
//! control/data segments backing a [`crate::ring::PointRing`].
//!
//! Segment names must start with `/` and contain no other `/`.

use crate::error::{Error, Result};
use std::ffi::CString;
use std::io;
use std::ptr;

/// POSIX shared memory segment wrapper. Automatically unmaps on drop;
/// does NOT unlink (the ring owner decides when to do that).
pub struct ShmSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
}

// SAFETY: the mapped region is shared memory accessed by multiple
// processes; synchronization is the caller's (ring's) responsibility via
// the single-writer/many-reader contract, not this wrapper's.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create a new segment, replacing any existing one of the same name.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        Self::validate_name(name)?;
        let c_name = CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))?;

        // SAFETY: c_name is a valid NUL-terminated string; shm_unlink tolerates
        // a missing segment; O_CREAT|O_RDWR|O_EXCL creates fresh or fails.
        let fd = unsafe {
            libc::shm_unlink(c_name.as_ptr());
            libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR | libc::O_EXCL, 0o600)
        };
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        // SAFETY: fd is valid from shm_open above; size is caller-provided and bounded
        // by ring capacity, ftruncate fails gracefully on absurd sizes.
        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Io(err));
        }

        let ptr = map_fd(fd, size)?;
        // SAFETY: fd is valid; the mapping (if mmap succeeded) holds its own reference.
        unsafe { libc::close(fd) };

        // SAFETY: ptr is a fresh PROT_WRITE mapping of exactly `size` bytes with no
        // other references yet.
        unsafe {
            ptr::write_bytes(ptr, 0, size);
        }

        Ok(Self { ptr, size, name: name.to_string() })
    }

    /// Attach to an existing segment.
    pub fn open(name: &str, size: usize) -> Result<Self> {
        Self::validate_name(name)?;
        let c_name = CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))?;

        // SAFETY: c_name is valid; O_RDWR opens an existing segment for read/write.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        let ptr = map_fd(fd, size)?;
        // SAFETY: fd is valid from shm_open above.
        unsafe { libc::close(fd) };

        Ok(Self { ptr, size, name: name.to_string() })
    }

    fn validate_name(name: &str) -> Result<()> {
        if !name.starts_with('/') {
            return Err(Error::InvalidName(format!("segment name must start with '/': {name}")));
        }
        if name.len() > 1 && name[1..].contains('/') {
            return Err(Error::InvalidName(format!("segment name cannot contain '/' after prefix: {name}")));
        }
        Ok(())
    }

    /// Unlink (delete) a shared memory segment by name. Missing is not an error.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))?;
        // SAFETY: c_name is valid; shm_unlink only touches the shm filesystem namespace.
        let ret = unsafe { libc::shm_unlink(c_name.as_ptr()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(Error::Io(err));
            }
        }
        Ok(())
    }

    pub fn exists(name: &str) -> bool {
        let Ok(c_name) = CString::new(name) else {
            return false;
        };
        // SAFETY: c_name is valid; O_RDONLY is a read-only existence probe.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            // SAFETY: fd is valid and not used again.
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn map_fd(fd: libc::c_int, size: usize) -> Result<*mut u8> {
    // SAFETY: fd is a valid descriptor from shm_open/ftruncate above; PROT_READ|WRITE
    // and MAP_SHARED are valid for a cross-process read-write mapping.
    let ptr = unsafe { libc::mmap(ptr::null_mut(), size, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0) };
    if ptr == libc::MAP_FAILED {
        // SAFETY: fd is still valid; close on the error path only.
        unsafe { libc::close(fd) };
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(ptr as *mut u8)
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: self.ptr/self.size come from a successful mmap in create()/open()
        // and Drop runs at most once.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_round_trip() {
        let name = format!("/dvk_test_segment_{}", std::process::id());
        let seg = ShmSegment::create(&name, 4096).unwrap();
        assert_eq!(seg.size(), 4096);
        let attached = ShmSegment::open(&name, 4096).unwrap();
        assert_eq!(attached.size(), 4096);
        drop(seg);
        drop(attached);
        ShmSegment::unlink(&name).unwrap();
    }

    #[test]
    fn rejects_name_without_leading_slash() {
        assert!(ShmSegment::create("bad_name", 16).is_err());
    }

    #[test]
    fn unlink_missing_segment_is_not_an_error() {
        assert!(ShmSegment::unlink("/dvk_never_existed_xyz").is_ok());
    }
}
