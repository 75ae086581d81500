use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{
    DEFAULT_DIR_LISTING_LIMIT, MountOption, ServerOption, normalize_root_path,
    parse_filer_meta_address,
};
use crate::error::FilerResult;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve file reads over HTTP
    Serve(ServeArgs),
    /// Mount the filer namespace read-only through FUSE
    Mount(MountArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Listening host
    #[arg(long, env = "FILERFS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "FILERFS_PORT", default_value_t = 8888)]
    pub port: u16,

    /// Filer address, host:port
    #[arg(long, env = "FILERFS_FILER", default_value = "localhost:8888")]
    pub filer: String,

    /// Metadata port of the filer, defaults to the filer port + 10000
    #[arg(long, env = "FILERFS_FILER_META_PORT")]
    pub filer_meta_port: Option<u16>,

    /// Master address, host:port
    #[arg(long, env = "FILERFS_MASTER", default_value = "localhost:9333")]
    pub master: String,

    /// Answer single-chunk reads with a redirect to the volume node
    #[arg(long, env = "FILERFS_REDIRECT_ON_READ")]
    pub redirect_on_read: bool,

    /// Reject directory listing requests
    #[arg(long, env = "FILERFS_DISABLE_DIR_LISTING")]
    pub disable_dir_listing: bool,

    /// Maximum entries returned by one listing
    #[arg(long, env = "FILERFS_DIR_LISTING_LIMIT", default_value_t = DEFAULT_DIR_LISTING_LIMIT)]
    pub dir_listing_limit: u32,

    /// Timeout of one chunk request to a volume node, in seconds
    #[arg(long, env = "FILERFS_CHUNK_FETCH_TIMEOUT", default_value_t = 30)]
    pub chunk_fetch_timeout: u64,
}

impl ServeArgs {
    pub fn to_option(&self) -> FilerResult<ServerOption> {
        Ok(ServerOption {
            master: self.master.clone(),
            filer_meta_address: parse_filer_meta_address(&self.filer, self.filer_meta_port)?,
            redirect_on_read: self.redirect_on_read,
            disable_dir_listing: self.disable_dir_listing,
            dir_listing_limit: self.dir_listing_limit,
            chunk_fetch_timeout: Duration::from_secs(self.chunk_fetch_timeout),
        })
    }
}

#[derive(clap::Args, Debug)]
pub struct MountArgs {
    /// Filer address, host:port
    #[arg(long, env = "FILERFS_FILER", default_value = "localhost:8888")]
    pub filer: String,

    /// Metadata port of the filer, defaults to the filer port + 10000
    #[arg(long, env = "FILERFS_FILER_META_PORT")]
    pub filer_meta_port: Option<u16>,

    /// Filer directory mounted as the filesystem root
    #[arg(long, env = "FILERFS_FILER_PATH", default_value = "/")]
    pub filer_path: String,

    /// Local mount point
    #[arg(long, env = "FILERFS_MOUNT_DIR")]
    pub dir: PathBuf,

    /// Master address, host:port
    #[arg(long, env = "FILERFS_MASTER", default_value = "localhost:9333")]
    pub master: String,

    /// Maximum entries cached for one directory listing
    #[arg(long, env = "FILERFS_DIR_LISTING_LIMIT", default_value_t = DEFAULT_DIR_LISTING_LIMIT)]
    pub dir_listing_limit: u32,

    /// Directory listing cache TTL, in milliseconds
    #[arg(long, env = "FILERFS_ENTRY_CACHE_TTL", default_value_t = 3000)]
    pub entry_cache_ttl: u64,

    /// Timeout of one chunk request to a volume node, in seconds
    #[arg(long, env = "FILERFS_CHUNK_FETCH_TIMEOUT", default_value_t = 30)]
    pub chunk_fetch_timeout: u64,
}

impl MountArgs {
    pub fn to_option(&self) -> FilerResult<MountOption> {
        Ok(MountOption {
            filer_meta_address: parse_filer_meta_address(&self.filer, self.filer_meta_port)?,
            filer_mount_root_path: normalize_root_path(&self.filer_path),
            master: self.master.clone(),
            mount_point: self.dir.clone(),
            dir_listing_limit: self.dir_listing_limit,
            entry_cache_ttl: Duration::from_millis(self.entry_cache_ttl),
            chunk_fetch_timeout: Duration::from_secs(self.chunk_fetch_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_args() {
        let args = Args::try_parse_from([
            "filerfs",
            "serve",
            "--filer",
            "10.0.0.2:8888",
            "--redirect-on-read",
        ])
        .unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        let option = serve.to_option().unwrap();
        assert_eq!(option.filer_meta_address, "10.0.0.2:18888");
        assert!(option.redirect_on_read);
        assert!(!option.disable_dir_listing);
        assert_eq!(option.chunk_fetch_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_mount_args() {
        let args = Args::try_parse_from([
            "filerfs",
            "mount",
            "--dir",
            "/mnt/x",
            "--filer-path",
            "/buckets/",
            "--filer-meta-port",
            "19000",
            "--entry-cache-ttl",
            "500",
        ])
        .unwrap();
        let Command::Mount(mount) = args.command else {
            panic!("expected mount");
        };
        let option = mount.to_option().unwrap();
        assert_eq!(option.filer_meta_address, "localhost:19000");
        assert_eq!(option.filer_mount_root_path, "/buckets");
        assert_eq!(option.entry_cache_ttl, Duration::from_millis(500));
        assert_eq!(option.mount_point, PathBuf::from("/mnt/x"));
    }

    #[test]
    fn test_mount_requires_dir() {
        assert!(Args::try_parse_from(["filerfs", "mount"]).is_err());
    }
}
