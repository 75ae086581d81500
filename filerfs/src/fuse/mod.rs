//! FUSE adapter
//!
//! Read-only implementation of the rfuse3 `Filesystem` trait for `Wfs`.
//! Inode numbers come from the gateway's inode table; file reads go through
//! the handle acquired on open.
pub mod mount;

use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
};
use rfuse3::{Errno, FileType, Result as FuseResult, Timestamp};
use tracing::{debug, info};

use crate::chunk::Entry;
use crate::error::FilerError;
use crate::vfs::node::{Dir, File, join_path, split_path};
use crate::vfs::{BLOCK_SIZE, FileHandle, ROOT_INO, Wfs};

const TTL: Duration = Duration::from_secs(1);
const MAX_WRITE: u32 = 1024 * 1024;

fn errno(e: FilerError) -> Errno {
    debug!("fuse op failed: {}", e);
    e.errno().into()
}

pub(crate) fn entry_kind(entry: &Entry) -> FileType {
    if entry.is_directory {
        FileType::Directory
    } else {
        FileType::RegularFile
    }
}

pub(crate) fn entry_to_attr(ino: u64, entry: &Entry) -> Result<FileAttr, FilerError> {
    let mtime = Timestamp::from(entry.mtime_system());
    let perm = match entry.attr.mode & 0o7777 {
        0 if entry.is_directory => 0o755,
        0 => 0o644,
        mode => mode,
    } as u16;
    let size = entry.total_size()?;
    Ok(FileAttr {
        ino,
        size,
        blocks: size.div_ceil(BLOCK_SIZE),
        atime: mtime,
        mtime,
        ctime: mtime,
        #[cfg(target_os = "macos")]
        crtime: mtime,
        kind: entry_kind(entry),
        perm,
        nlink: 1,
        uid: entry.attr.uid,
        gid: entry.attr.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: BLOCK_SIZE as u32,
    })
}

/// `.` and `..` followed by `children`, starting after `offset`.
pub(crate) fn dir_entries(
    ino: u64,
    parent_ino: u64,
    children: &[(u64, &Entry)],
    offset: i64,
) -> Vec<DirectoryEntry> {
    let mut all = Vec::with_capacity(children.len() + 2);
    all.push(DirectoryEntry {
        inode: ino,
        kind: FileType::Directory,
        name: OsString::from("."),
        offset: 1,
    });
    all.push(DirectoryEntry {
        inode: parent_ino,
        kind: FileType::Directory,
        name: OsString::from(".."),
        offset: 2,
    });
    for (i, (child_ino, entry)) in children.iter().enumerate() {
        all.push(DirectoryEntry {
            inode: *child_ino,
            kind: entry_kind(entry),
            name: OsString::from(entry.name()),
            offset: i as i64 + 3,
        });
    }
    let start = offset.max(0) as usize;
    if start >= all.len() {
        Vec::new()
    } else {
        all.split_off(start)
    }
}

impl Wfs {
    fn path_of_ino(&self, ino: u64) -> FuseResult<String> {
        self.inodes()
            .path_of(ino)
            .ok_or_else(|| Errno::from(libc::ENOENT))
    }
}

impl Filesystem for Wfs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!(
            "mounted filer {}{} at {}",
            self.option().filer_meta_address,
            self.root().path,
            self.option().mount_point.display()
        );
        let max_write = NonZeroU32::new(MAX_WRITE).ok_or_else(|| Errno::from(libc::EINVAL))?;
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {
        info!("unmounting {}", self.option().mount_point.display());
    }

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        let dir = Dir::new(self.path_of_ino(parent)?);
        let path = dir.child_path(&name.to_string_lossy());
        let entry = self.find_entry(&path).await.map_err(errno)?;
        let ino = self.inodes().lookup(&path);
        Ok(ReplyEntry {
            ttl: TTL,
            attr: entry_to_attr(ino, &entry).map_err(errno)?,
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let path = self.path_of_ino(ino)?;
        let entry = self.find_entry(&path).await.map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: entry_to_attr(ino, &entry).map_err(errno)?,
        })
    }

    async fn open(&self, req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let path = self.path_of_ino(ino)?;
        let entry = self.find_entry(&path).await.map_err(errno)?;
        if entry.is_directory {
            return Err(libc::EISDIR.into());
        }
        let fh = self.acquire_handle(File::from_entry(entry), req.uid, req.gid);
        Ok(ReplyOpen {
            fh: fh.handle,
            flags: 0,
        })
    }

    async fn read(
        &self,
        req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let path = self.path_of_ino(ino)?;
        let handle = match self.handle(fh) {
            Some(h) if h.file.full_path() == path => h,
            _ => {
                // Handle already released or never opened through us.
                let entry = self.find_entry(&path).await.map_err(errno)?;
                Arc::new(FileHandle {
                    handle: fh,
                    file: File::from_entry(entry),
                    uid: req.uid,
                    gid: req.gid,
                })
            }
        };
        let data = handle
            .read(self.reader(), offset, size as u64)
            .await
            .map_err(errno)?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn release(
        &self,
        _req: Request,
        inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        let path = match self.handle(fh) {
            Some(h) => h.file.full_path(),
            None => self.path_of_ino(inode)?,
        };
        self.release_handle(&path, fh);
        Ok(())
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let path = self.path_of_ino(ino)?;
        let entry = self.find_entry(&path).await.map_err(errno)?;
        if !entry.is_directory {
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let path = self.path_of_ino(ino)?;
        let entries = self.list_directory(&path).await.map_err(errno)?;

        let parent_ino = if ino == ROOT_INO {
            ROOT_INO
        } else {
            let (parent, _) = split_path(&path);
            self.inodes().ino_of(parent).unwrap_or(ROOT_INO)
        };
        let children: Vec<(u64, &Entry)> = entries
            .iter()
            .map(|e| (self.inodes().assign(&join_path(&path, e.name())), e))
            .collect();
        let listed = dir_entries(ino, parent_ino, &children, offset);

        let boxed: Self::DirEntryStream<'a> = Box::pin(stream::iter(listed.into_iter().map(Ok)));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let st = Wfs::statfs(self).await;
        Ok(ReplyStatFs {
            blocks: st.blocks,
            bfree: st.bfree,
            bavail: st.bavail,
            files: st.files,
            ffree: st.ffree,
            bsize: st.bsize,
            namelen: st.namelen,
            frsize: st.frsize,
        })
    }

    async fn forget(&self, _req: Request, inode: u64, nlookup: u64) {
        self.inodes().forget(inode, nlookup);
    }

    async fn batch_forget(&self, _req: Request, inodes: &[(u64, u64)]) {
        for &(inode, nlookup) in inodes {
            self.inodes().forget(inode, nlookup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Attr;
    use crate::testutil::{MemoryVolume, chunked_file, dir_entry};

    #[test]
    fn test_entry_to_attr() {
        let volume = MemoryVolume::new();
        let (mut entry, _) = chunked_file(&volume, "/f", &[700, 300], None);
        entry.attr.uid = 1000;
        entry.attr.mode = 0o100640;
        let attr = entry_to_attr(9, &entry).unwrap();
        assert_eq!(attr.ino, 9);
        assert_eq!(attr.size, 1000);
        assert_eq!(attr.blocks, 2);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.uid, 1000);
        assert!(matches!(attr.kind, FileType::RegularFile));

        let dir = entry_to_attr(
            2,
            &Entry {
                full_path: "/d".into(),
                is_directory: true,
                attr: Attr::default(),
                chunks: Vec::new(),
            },
        )
        .unwrap();
        assert_eq!(dir.perm, 0o755);
        assert!(matches!(dir.kind, FileType::Directory));
    }

    #[test]
    fn test_dir_entries_offsets() {
        let a = dir_entry("/d/a");
        let b = chunked_file(&MemoryVolume::new(), "/d/b", &[1], None).0;
        let children = vec![(5, &a), (6, &b)];

        let all = dir_entries(3, ROOT_INO, &children, 0);
        let names: Vec<_> = all.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec![".", "..", "a", "b"]);
        assert_eq!(all[3].offset, 4);
        assert!(matches!(all[2].kind, FileType::Directory));
        assert!(matches!(all[3].kind, FileType::RegularFile));

        let rest = dir_entries(3, ROOT_INO, &children, 3);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].inode, 6);
        assert!(dir_entries(3, ROOT_INO, &children, 10).is_empty());
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FilerError::NotFound("/x".into()).errno(), libc::ENOENT);
        assert_eq!(FilerError::DirListingDisabled.errno(), libc::EACCES);
        assert_eq!(FilerError::Transport("x".into()).errno(), libc::EIO);
    }
}
