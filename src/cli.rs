//! Command-line parsing for the `curvefs-csi` binary

use std::path::PathBuf;

use crate::params::Params;

pub const USAGE: &str = "\
Usage: curvefs-csi [--config <config.yaml>] <command> [args...]

Commands:
  create-fs <volume-id> <capacity-bytes> [key=value ...]
  delete-fs <volume-id> [key=value ...]
  mount <fsname> <mount-path> <mount-uuid> [key=value ...] [-o flag=value ...]
  umount <target-path> [mount-uuid]

Parameters (key=value) are storage-class parameters, e.g.
  mdsAddr=10.0.0.1:6700 fsType=s3 s3Endpoint=... s3AccessKey=... s3SecretKey=... s3Bucket=...
  mdsAddr=10.0.0.1:6700 fsType=volume backendVolName=pool backendVolSizeGB=20

Example:
  curvefs-csi --config /etc/curvefs-csi/config.yaml mount fs1 /mnt/fs1 6f1c mdsAddr=10.0.0.1:6700 fsType=s3 -o diskCache.diskCacheType=2";

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

/// Driver operation to run
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateFs {
        volume_id: String,
        capacity_bytes: i64,
        params: Params,
    },
    DeleteFs {
        volume_id: String,
        params: Params,
    },
    Mount {
        fsname: String,
        mount_path: PathBuf,
        mount_uuid: String,
        params: Params,
        /// `None` when no `-o` was given
        mount_flags: Option<Vec<String>>,
    },
    Umount {
        target_path: PathBuf,
        mount_uuid: String,
    },
}

/// Command-line usage error
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{0}")]
pub struct UsageError(pub String);

impl Cli {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut config_path = None;
        if args.first().map(String::as_str) == Some("--config") {
            if args.len() < 2 {
                return Err(UsageError("--config requires a path".to_string()));
            }
            config_path = Some(PathBuf::from(args[1].clone()));
            args.drain(..2);
        }

        let (name, rest) = args
            .split_first()
            .ok_or_else(|| UsageError("missing command".to_string()))?;

        let command = match name.as_str() {
            "create-fs" => {
                let [volume_id, capacity, extra @ ..] = rest else {
                    return Err(UsageError(
                        "create-fs needs <volume-id> <capacity-bytes>".to_string(),
                    ));
                };
                let capacity_bytes = capacity.parse::<i64>().map_err(|_| {
                    UsageError(format!("capacity-bytes must be an integer: {}", capacity))
                })?;
                Command::CreateFs {
                    volume_id: volume_id.clone(),
                    capacity_bytes,
                    params: parse_params(extra)?,
                }
            }
            "delete-fs" => {
                let [volume_id, extra @ ..] = rest else {
                    return Err(UsageError("delete-fs needs <volume-id>".to_string()));
                };
                Command::DeleteFs {
                    volume_id: volume_id.clone(),
                    params: parse_params(extra)?,
                }
            }
            "mount" => {
                let [fsname, mount_path, mount_uuid, extra @ ..] = rest else {
                    return Err(UsageError(
                        "mount needs <fsname> <mount-path> <mount-uuid>".to_string(),
                    ));
                };
                let (params, mount_flags) = split_mount_options(extra)?;
                Command::Mount {
                    fsname: fsname.clone(),
                    mount_path: PathBuf::from(mount_path),
                    mount_uuid: mount_uuid.clone(),
                    params,
                    mount_flags,
                }
            }
            "umount" => match rest {
                [target] => Command::Umount {
                    target_path: PathBuf::from(target),
                    mount_uuid: String::new(),
                },
                [target, uuid] => Command::Umount {
                    target_path: PathBuf::from(target),
                    mount_uuid: uuid.clone(),
                },
                _ => {
                    return Err(UsageError(
                        "umount needs <target-path> [mount-uuid]".to_string(),
                    ))
                }
            },
            other => return Err(UsageError(format!("unknown command: {}", other))),
        };

        Ok(Cli {
            config_path,
            command,
        })
    }
}

fn parse_params(items: &[String]) -> Result<Params, UsageError> {
    let mut params = Params::new();
    for item in items {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| UsageError(format!("expected key=value, got {:?}", item)))?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

fn split_mount_options(items: &[String]) -> Result<(Params, Option<Vec<String>>), UsageError> {
    let mut plain = Vec::new();
    let mut flags: Option<Vec<String>> = None;

    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        if item == "-o" {
            let flag = iter
                .next()
                .ok_or_else(|| UsageError("-o requires a flag".to_string()))?;
            flags.get_or_insert_with(Vec::new).push(flag.clone());
        } else {
            plain.push(item.clone());
        }
    }

    Ok((parse_params(&plain)?, flags))
}
