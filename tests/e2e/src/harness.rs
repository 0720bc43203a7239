//! Test harness for e2e tests
//!
//! Each harness owns a scratch directory holding fake `curvefs_tool`,
//! `curve-fuse` and `umount` executables. The fakes append their argv to a
//! log file and exit 0, unless a failure has been armed with
//! [`DriverHarness::fail_next`].
//!
//! ```ignore
//! let harness = DriverHarness::new()?;
//! harness.tool().create_fs("pvc-1", 0, &params).await?;
//! assert_eq!(harness.invocations(FakeBinary::Tool)?.len(), 1);
//! ```

use anyhow::{Context, Result};
use curvefs_csi::config::DriverConfig;
use curvefs_csi::exec::SystemRunner;
use curvefs_csi::mount::FuseMounter;
use curvefs_csi::params::Params;
use curvefs_csi::tool::FsTool;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Marks the end of one invocation in a fake binary's log
const END_MARKER: &str = "--end-of-invocation--";

/// How often to poll for asynchronous cleanup
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Base client config written for every harness
pub const BASE_CLIENT_CONF: &str = "\
# curve-fuse client config
mdsOpt.rpcRetryOpt.addrs=127.0.0.1:6700
fuseClient.attrTimeOut=30

diskCache.diskCacheType=0
disk_cache.cache_dir=/curvefs/client/data/cache
";

/// Initialize logging for tests (call once per test run)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a parameter map from literal pairs
pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// External programs replaced by fakes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBinary {
    Tool,
    Client,
    Umount,
}

impl FakeBinary {
    fn name(self) -> &'static str {
        match self {
            FakeBinary::Tool => "curvefs_tool",
            FakeBinary::Client => "curve-fuse",
            FakeBinary::Umount => "umount",
        }
    }
}

/// Scratch environment with fake external binaries
pub struct DriverHarness {
    dir: TempDir,
    config: DriverConfig,
}

impl DriverHarness {
    /// Create a harness with default settings
    pub fn new() -> Result<Self> {
        Self::with_cleanup_timeout("5s")
    }

    /// Create a harness with a custom cleanup deadline (humantime string)
    pub fn with_cleanup_timeout(cleanup_timeout: &str) -> Result<Self> {
        init_logging();
        let dir = tempfile::tempdir().context("Failed to create scratch dir")?;
        let root = dir.path();

        for sub in ["bin", "logs", "fail", "conf", "cache"] {
            fs::create_dir_all(root.join(sub))
                .with_context(|| format!("Failed to create {}", sub))?;
        }
        for binary in [FakeBinary::Tool, FakeBinary::Client, FakeBinary::Umount] {
            write_fake_binary(root, binary)?;
        }
        fs::write(root.join("conf").join("client.conf"), BASE_CLIENT_CONF)?;
        fs::write(root.join("conf").join("tools.conf"), "mdsAddr=127.0.0.1:6700\n")?;

        let yaml = format!(
            r#"
logging:
  level: debug
tool:
  binary: {root}/bin/curvefs_tool
  conf_path: {root}/conf/tools.conf
client:
  binary: {root}/bin/curve-fuse
  conf_path: {root}/conf/client.conf
  cache_dir_prefix: {root}/cache/
  umount_binary: {root}/bin/umount
  cleanup_timeout: {cleanup_timeout}
"#,
            root = root.display(),
            cleanup_timeout = cleanup_timeout,
        );
        let config = DriverConfig::from_str(&yaml).context("Failed to parse harness config")?;
        config.validate()?;
        debug!("Harness ready in {:?}", root);

        Ok(Self { dir, config })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn tool(&self) -> FsTool {
        FsTool::new(self.config.tool.clone(), Arc::new(SystemRunner))
    }

    pub fn mounter(&self) -> FuseMounter {
        FuseMounter::new(self.config.client.clone(), Arc::new(SystemRunner))
    }

    pub fn base_client_conf(&self) -> PathBuf {
        PathBuf::from(&self.config.client.conf_path)
    }

    pub fn mount_conf(&self, mount_uuid: &str) -> PathBuf {
        self.config.client.mount_conf_path(mount_uuid)
    }

    pub fn mount_cache_dir(&self, mount_uuid: &str) -> PathBuf {
        self.config.client.mount_cache_dir(mount_uuid)
    }

    /// Make every following run of `binary` print `message` to stderr and exit 1
    pub fn fail_next(&self, binary: FakeBinary, message: &str) -> Result<()> {
        fs::write(self.root().join("fail").join(binary.name()), message)?;
        Ok(())
    }

    /// Argument vectors of every recorded run of `binary`
    pub fn invocations(&self, binary: FakeBinary) -> Result<Vec<Vec<String>>> {
        let log = self.root().join("logs").join(format!("{}.log", binary.name()));
        if !log.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&log)?;

        let mut runs = Vec::new();
        let mut current = Vec::new();
        for line in content.lines() {
            if line == END_MARKER {
                runs.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        Ok(runs)
    }

    /// Wait until `path` no longer exists
    pub async fn wait_removed(&self, path: &Path, max_wait: Duration) -> Result<()> {
        timeout(max_wait, async {
            while path.exists() {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("{:?} still exists after {:?}", path, max_wait))
    }
}

fn write_fake_binary(root: &Path, binary: FakeBinary) -> Result<()> {
    let name = binary.name();
    let script = format!(
        r#"#!/bin/sh
log="{root}/logs/{name}.log"
for arg in "$@"; do
  printf '%s\n' "$arg" >> "$log"
done
printf '%s\n' '{end}' >> "$log"
if [ -f "{root}/fail/{name}" ]; then
  cat "{root}/fail/{name}" >&2
  exit 1
fi
echo "{name} ok"
"#,
        root = root.display(),
        name = name,
        end = END_MARKER,
    );

    let path = root.join("bin").join(name);
    fs::write(&path, script).with_context(|| format!("Failed to write fake {}", name))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}
