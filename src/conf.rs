//! Per-mount client config patching
//!
//! The FUSE client reads a flat `key=value` file. Mount flags from the
//! volume capability are applied to a copy of the base file so each mount
//! gets its own `<base>.<mount-uuid>` config, and cache directories are
//! namespaced by the mount uuid so mounts never share a disk cache.

use std::collections::HashMap;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{CsiError, Result};

/// Key holding the `;`-separated list of cache directories
pub const CACHE_DIR_KEY: &str = "disk_cache.cache_dir";

/// Key selecting the disk cache mode
pub const CACHE_TYPE_KEY: &str = "diskCache.diskCacheType";

/// Disk cache modes that need a cache directory on disk
const CACHE_ENABLED_VALUES: [&str; 2] = ["1", "2"];

/// One line of a client config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfLine {
    /// Comment, blank line or anything without `=`; written back untouched
    Verbatim(String),
    /// `key=value` split at the first `=`
    Entry { key: String, value: String },
}

impl ConfLine {
    fn parse(line: &str) -> Self {
        if line.starts_with('#') {
            return ConfLine::Verbatim(line.to_string());
        }
        match line.split_once('=') {
            Some((key, value)) => ConfLine::Entry {
                key: key.to_string(),
                value: value.to_string(),
            },
            None => ConfLine::Verbatim(line.to_string()),
        }
    }
}

/// Ordered, line-preserving view of a client config file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfFile {
    lines: Vec<ConfLine>,
}

/// What a patch pass found out while applying overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// An override switched the disk cache on
    pub cache_enabled: bool,
}

impl ConfFile {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(ConfLine::parse).collect(),
        }
    }

    pub fn lines(&self) -> &[ConfLine] {
        &self.lines
    }

    /// Value of the first entry with `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            ConfLine::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Render the file, one `\n`-terminated line per entry
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                ConfLine::Verbatim(text) => out.push_str(text),
                ConfLine::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        out
    }

    /// Apply `key=value` overrides.
    ///
    /// Existing entries are updated in place; keys with no matching line are
    /// appended in the order they were first given. When a key is repeated in
    /// `overrides` the last value wins. Each override is consumed by at most
    /// one line.
    ///
    /// The first `disk_cache.cache_dir` entry is namespaced by `mount_uuid`
    /// whether or not it is overridden, so a patched file never points at the
    /// shared base cache.
    pub fn apply_overrides(
        &mut self,
        overrides: &[(String, String)],
        mount_uuid: &str,
    ) -> PatchOutcome {
        let mut order: Vec<&str> = Vec::new();
        let mut pending: HashMap<&str, &str> = HashMap::new();
        for (key, value) in overrides {
            if pending.insert(key.as_str(), value.as_str()).is_none() {
                order.push(key.as_str());
            }
        }

        let outcome = PatchOutcome {
            cache_enabled: pending
                .get(CACHE_TYPE_KEY)
                .is_some_and(|v| CACHE_ENABLED_VALUES.contains(v)),
        };

        let mut cache_dir_seen = false;
        for line in &mut self.lines {
            if let ConfLine::Entry { key, value } = line {
                let new_value = pending.remove(key.as_str());
                if key.as_str() == CACHE_DIR_KEY && !cache_dir_seen {
                    cache_dir_seen = true;
                    let dirs = new_value.unwrap_or(value.as_str());
                    *value = namespace_cache_dirs(dirs, mount_uuid);
                } else if let Some(new_value) = new_value {
                    *value = new_value.to_string();
                }
            }
        }

        for key in order {
            if let Some(new_value) = pending.remove(key) {
                self.lines.push(ConfLine::Entry {
                    key: key.to_string(),
                    value: override_value(key, new_value, mount_uuid),
                });
            }
        }

        outcome
    }
}

fn override_value(key: &str, value: &str, mount_uuid: &str) -> String {
    if key == CACHE_DIR_KEY {
        namespace_cache_dirs(value, mount_uuid)
    } else {
        value.to_string()
    }
}

/// Insert `/<mount_uuid>` after the path of each `;`-separated `path[:extra]` entry.
///
/// `/data/cache:100GB;/data2/cache` with `abc` becomes
/// `/data/cache/abc:100GB;/data2/cache/abc`.
pub fn namespace_cache_dirs(value: &str, mount_uuid: &str) -> String {
    value
        .split(';')
        .map(|entry| {
            let (path, extra) = match entry.split_once(':') {
                Some((path, extra)) => (path, Some(extra)),
                None => (entry, None),
            };
            if !mount_uuid.is_empty() && path.ends_with(&format!("/{}", mount_uuid)) {
                // Reapplying a patch inserts the segment again.
                warn!(
                    "Cache dir {:?} already ends with mount id {:?}, namespacing again",
                    path, mount_uuid
                );
            }
            match extra {
                Some(extra) => format!("{}/{}:{}", path, mount_uuid, extra),
                None => format!("{}/{}", path, mount_uuid),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Split mount flags of the form `key=value` at the first `=`.
/// Flags without `=` carry no config override and are skipped.
pub fn parse_mount_flags(flags: &[String]) -> Vec<(String, String)> {
    flags
        .iter()
        .filter_map(|flag| match flag.split_once('=') {
            Some((key, value)) => Some((key.to_string(), value.to_string())),
            None => {
                debug!("Skipping mount flag without value: {:?}", flag);
                None
            }
        })
        .collect()
}

/// Write a per-mount client config derived from `base_path`.
///
/// Reads the base config, applies `mount_flags`, writes the result to
/// `target_path` and, when the flags switch the disk cache on, makes sure
/// `cache_dir` exists.
pub async fn apply_mount_flags(
    base_path: &Path,
    target_path: &Path,
    mount_flags: &[String],
    mount_uuid: &str,
    cache_dir: &Path,
) -> Result<PatchOutcome> {
    let content = tokio::fs::read_to_string(base_path).await.map_err(|e| {
        CsiError::internal(format!(
            "mount config: failed to read conf {}: {}",
            base_path.display(),
            e
        ))
    })?;

    let mut conf = ConfFile::parse(&content);
    let overrides = parse_mount_flags(mount_flags);
    let outcome = conf.apply_overrides(&overrides, mount_uuid);

    write_conf(target_path, conf.render().as_bytes())
        .await
        .map_err(|e| {
            CsiError::internal(format!(
                "mount config: failed to write new conf {}: {}",
                target_path.display(),
                e
            ))
        })?;

    info!(
        "Wrote mount config {:?} ({} override(s))",
        target_path,
        overrides.len()
    );

    if outcome.cache_enabled {
        create_cache_dir(cache_dir).await.map_err(|e| {
            CsiError::internal(format!(
                "mount config: failed to create cache dir {}: {}",
                cache_dir.display(),
                e
            ))
        })?;
        debug!("Ensured cache dir {:?}", cache_dir);
    }

    Ok(outcome)
}

async fn write_conf(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

async fn create_cache_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);
    builder.create(path).await
}
