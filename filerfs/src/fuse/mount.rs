//! Mount helpers for starting/stopping FUSE
//!
//! Only Linux is supported; mounting goes through fusermount3 so no root
//! privilege is needed.

use std::path::Path;

use rfuse3::MountOptions;

use crate::vfs::Wfs;

/// Default mount options named after the filesystem.
pub fn default_mount_options() -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name("filerfs");
    mo
}

/// Mounts `fs` at `mount_point`; the returned handle unmounts it.
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged(
    fs: Wfs,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let session = rfuse3::raw::Session::new(default_mount_options());
    session.mount_with_unprivileged(fs, mount_point).await
}

#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged(
    _fs: Wfs,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
