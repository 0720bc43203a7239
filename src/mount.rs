//! Mount management through the `curve-fuse` client

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conf::apply_mount_flags;
use crate::config::ClientConfig;
use crate::error::{CsiError, Result};
use crate::exec::{run_checked, CommandRunner};
use crate::params::{require_mds_addr, FlagList, Params, PARAM_CLIENT_CONF_PATH, PARAM_FS_TYPE};

/// Options passed to every `curve-fuse` invocation
const FIXED_MOUNT_OPTIONS: [&str; 2] = ["default_permissions", "allow_other"];

/// Client parameters rendered as `--key=value` instead of `-o key=value`
const DOUBLE_DASH_PARAMS: [&str; 1] = ["mdsaddr"];

/// A filesystem mounted by this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMount {
    /// Mount path
    pub path: PathBuf,
    /// Filesystem name
    pub fsname: String,
    /// Mount unique identifier (may be empty)
    pub mount_uuid: String,
    /// Client config the mount was started with
    pub conf_path: String,
}

/// Handle to the background removal of per-mount files
#[derive(Debug)]
pub struct CleanupTask {
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    fn none() -> Self {
        Self { handle: None }
    }

    /// Whether a cleanup was scheduled
    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the cleanup to finish. The task enforces its own deadline.
    pub async fn wait(self) {
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                warn!("Mount cleanup task failed: {}", e);
            }
        }
    }
}

/// Mounts and unmounts filesystems by shelling out to the FUSE client
pub struct FuseMounter {
    config: ClientConfig,
    runner: Arc<dyn CommandRunner>,
    mounts: Mutex<Vec<ActiveMount>>,
}

impl FuseMounter {
    pub fn new(config: ClientConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            mounts: Mutex::new(Vec::new()),
        }
    }

    /// Mount filesystem `fsname` at `mount_path`.
    ///
    /// When `mount_flags` is given (even empty) a per-mount copy of the
    /// client config is written with the flags applied and the client is
    /// pointed at it.
    pub async fn mount_fs(
        &self,
        fsname: &str,
        mount_path: &Path,
        params: &Params,
        mount_flags: Option<&[String]>,
        mount_uuid: &str,
    ) -> Result<()> {
        let mut flags = self.mount_params(params)?;

        if let Some(mount_flags) = mount_flags {
            let base = flags.get("conf").unwrap_or_default().to_string();
            let target = self.config.mount_conf_path(mount_uuid);
            apply_mount_flags(
                Path::new(&base),
                &target,
                mount_flags,
                mount_uuid,
                &self.config.mount_cache_dir(mount_uuid),
            )
            .await?;
            flags.set("conf", target.to_string_lossy());
        }

        flags.set("fsname", fsname);
        let args = fuse_args(&flags, mount_path);

        info!("curve-fuse mount args: {:?}", args);
        run_checked(
            self.runner.as_ref(),
            "curve-fuse mount",
            &self.config.binary,
            &args,
        )
        .await?;

        let active = ActiveMount {
            path: mount_path.to_path_buf(),
            fsname: fsname.to_string(),
            mount_uuid: mount_uuid.to_string(),
            conf_path: flags.get("conf").unwrap_or_default().to_string(),
        };
        {
            let mut mounts = self.mounts.lock();
            mounts.retain(|m| m.path != active.path);
            mounts.push(active);
        }

        info!("Successfully mounted {} at {:?}", fsname, mount_path);
        Ok(())
    }

    /// Unmount `target_path` and schedule removal of the per-mount config and
    /// cache directory when `mount_uuid` is non-empty.
    ///
    /// The returned task can be awaited or dropped; it runs either way.
    pub async fn umount_fs(
        &self,
        target_path: &Path,
        mount_uuid: &str,
    ) -> Result<CleanupTask> {
        let args = vec![target_path.to_string_lossy().into_owned()];
        info!("Unmounting {:?}", target_path);

        let output = self
            .runner
            .run(&self.config.umount_binary, &args)
            .await
            .map_err(|e| {
                CsiError::internal(format!(
                    "umount {} failed. output: , err: {}",
                    target_path.display(),
                    e
                ))
            })?;
        if !output.success() {
            return Err(CsiError::internal(format!(
                "umount {} failed. output: {}, err: {}",
                target_path.display(),
                output.combined(),
                output.status_text()
            )));
        }

        self.mounts.lock().retain(|m| m.path != target_path);

        if mount_uuid.is_empty() {
            return Ok(CleanupTask::none());
        }

        let conf_path = self.config.mount_conf_path(mount_uuid);
        let cache_dir = self.config.mount_cache_dir(mount_uuid);
        let deadline = self.config.cleanup_timeout;
        let handle = tokio::spawn(cleanup_mount_files(conf_path, cache_dir, deadline));
        Ok(CleanupTask {
            handle: Some(handle),
        })
    }

    /// Build the client parameters: `mdsaddr`, `conf`, `fstype`
    fn mount_params(&self, params: &Params) -> Result<FlagList> {
        let mut flags = FlagList::new();
        flags.set("mdsaddr", require_mds_addr(params)?);
        flags.set(
            "conf",
            params
                .get(PARAM_CLIENT_CONF_PATH)
                .map(String::as_str)
                .unwrap_or(self.config.conf_path.as_str()),
        );
        let fs_type = params
            .get(PARAM_FS_TYPE)
            .ok_or_else(|| CsiError::invalid("fsType is missing"))?;
        flags.set("fstype", fs_type.as_str());
        Ok(flags)
    }

    /// Get list of active mounts
    pub fn list_mounts(&self) -> Vec<ActiveMount> {
        self.mounts.lock().clone()
    }

    /// Number of active mounts
    pub fn count(&self) -> usize {
        self.mounts.lock().len()
    }
}

/// Render the client command line:
/// `-o default_permissions -o allow_other --mdsaddr=.. -o k=v .. <mount_path>`
pub fn fuse_args(flags: &FlagList, mount_path: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(FIXED_MOUNT_OPTIONS.len() * 2 + flags.len() * 2 + 1);
    for option in FIXED_MOUNT_OPTIONS {
        args.push("-o".to_string());
        args.push(option.to_string());
    }
    for (key, value) in flags.iter() {
        if DOUBLE_DASH_PARAMS.contains(&key) {
            args.push(format!("--{}={}", key, value));
        } else {
            args.push("-o".to_string());
            args.push(format!("{}={}", key, value));
        }
    }
    args.push(mount_path.to_string_lossy().into_owned());
    args
}

async fn cleanup_mount_files(conf_path: PathBuf, cache_dir: PathBuf, deadline: Duration) {
    let work = async {
        let conf = tokio::fs::remove_file(&conf_path).await;
        let cache = tokio::fs::remove_dir_all(&cache_dir).await;
        (conf, cache)
    };

    match tokio::time::timeout(deadline, work).await {
        Ok((conf, cache)) => {
            report_cleanup(&conf_path, conf);
            report_cleanup(&cache_dir, cache);
        }
        Err(_) => warn!(
            "Cleanup of {:?} and {:?} did not finish within {:?}",
            conf_path, cache_dir, deadline
        ),
    }
}

fn report_cleanup(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => debug!("{:?} already gone", path),
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}
