//! Storage-class parameter validation and flag lists
//!
//! The CSI layer hands each operation an unordered `key -> value` mapping
//! taken from the storage class. Validation turns it into typed values and
//! an ordered [`FlagList`] so that generated command lines are deterministic.

use std::collections::HashMap;

use crate::error::{CsiError, Result};

/// Storage-class parameter mapping
pub type Params = HashMap<String, String>;

pub const PARAM_MDS_ADDR: &str = "mdsAddr";
pub const PARAM_TOOL_CONF_PATH: &str = "toolConfPath";
pub const PARAM_CLIENT_CONF_PATH: &str = "clientConfPath";
pub const PARAM_FS_TYPE: &str = "fsType";
pub const PARAM_ENABLE_SUM_IN_DIR: &str = "enableSumInDir";
pub const PARAM_S3_ENDPOINT: &str = "s3Endpoint";
pub const PARAM_S3_ACCESS_KEY: &str = "s3AccessKey";
pub const PARAM_S3_SECRET_KEY: &str = "s3SecretKey";
pub const PARAM_S3_BUCKET: &str = "s3Bucket";
pub const PARAM_BACKEND_VOL_NAME: &str = "backendVolName";
pub const PARAM_BACKEND_VOL_SIZE_GB: &str = "backendVolSizeGB";

/// Smallest accepted backing volume, in GiB
pub const MIN_BACKEND_VOL_SIZE_GB: i64 = 10;

/// Ordered list of `(key, value)` flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagList {
    entries: Vec<(String, String)>,
}

impl FlagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag, replacing an existing value in place or appending a new one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as single-dash flags: `-key=value`
    pub fn to_dash_args(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("-{}={}", k, v)).collect()
    }
}

/// Filesystem backend selected by the `fsType` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsType {
    /// Data stored in an S3-compatible object store
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
    },
    /// Data stored on a backing block volume
    Volume { name: String, size_gb: String },
}

impl FsType {
    /// Value passed to the tool and client as `fsType` / `fstype`
    pub fn name(&self) -> &'static str {
        match self {
            FsType::S3 { .. } => "s3",
            FsType::Volume { .. } => "volume",
        }
    }

    /// Parse the backend and its required sub-parameters
    pub fn from_params(params: &Params) -> Result<Self> {
        let fs_type = params
            .get(PARAM_FS_TYPE)
            .ok_or_else(|| CsiError::invalid("fsType is missing"))?;

        match fs_type.as_str() {
            "s3" => {
                let fields = (
                    params.get(PARAM_S3_ENDPOINT),
                    params.get(PARAM_S3_ACCESS_KEY),
                    params.get(PARAM_S3_SECRET_KEY),
                    params.get(PARAM_S3_BUCKET),
                );
                match fields {
                    (Some(endpoint), Some(access_key), Some(secret_key), Some(bucket)) => {
                        Ok(FsType::S3 {
                            endpoint: endpoint.clone(),
                            access_key: access_key.clone(),
                            secret_key: secret_key.clone(),
                            bucket: bucket.clone(),
                        })
                    }
                    _ => Err(CsiError::invalid("s3Info is incomplete")),
                }
            }
            "volume" => {
                let name = params
                    .get(PARAM_BACKEND_VOL_NAME)
                    .ok_or_else(|| CsiError::invalid("backendVolName is missing"))?;
                let size = params
                    .get(PARAM_BACKEND_VOL_SIZE_GB)
                    .ok_or_else(|| CsiError::invalid("backendVolSize is missing"))?;
                let size_gb = parse_int(size)
                    .ok_or_else(|| CsiError::invalid("backendVolSize is not integer"))?;
                if size_gb < MIN_BACKEND_VOL_SIZE_GB {
                    return Err(CsiError::invalid("backendVolSize must larger than 10GB"));
                }
                Ok(FsType::Volume {
                    name: name.clone(),
                    size_gb: size.clone(),
                })
            }
            other => Err(CsiError::invalid(format!("unsupported fsType {}", other))),
        }
    }

    /// Append the tool flags describing this backend
    pub fn append_tool_flags(&self, flags: &mut FlagList) {
        match self {
            FsType::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
            } => {
                flags.set("s3_endpoint", endpoint.as_str());
                flags.set("s3_ak", access_key.as_str());
                flags.set("s3_sk", secret_key.as_str());
                flags.set("s3_bucket_name", bucket.as_str());
            }
            FsType::Volume { name, size_gb } => {
                flags.set("volumeName", name.as_str());
                flags.set("volumeSize", size_gb.as_str());
            }
        }
    }
}

/// Require the metadata server address
pub fn require_mds_addr(params: &Params) -> Result<&str> {
    params
        .get(PARAM_MDS_ADDR)
        .map(String::as_str)
        .ok_or_else(|| CsiError::invalid("mdsAddr is missing"))
}

/// Parse a signed integer, inferring the radix from its prefix.
///
/// Accepts `0x`/`0X` hex, `0o`/`0O` or a bare leading `0` as octal,
/// `0b`/`0B` binary, and decimal otherwise. `_` separators are allowed
/// between digits and right after a radix prefix.
pub fn parse_int(input: &str) -> Option<i64> {
    let (negative, body) = match input.as_bytes().first()? {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let (radix, digits, prefixed) = if let Some(rest) = strip_prefix_ci(body, "0x") {
        (16, rest, true)
    } else if let Some(rest) = strip_prefix_ci(body, "0o") {
        (8, rest, true)
    } else if let Some(rest) = strip_prefix_ci(body, "0b") {
        (2, rest, true)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..], true)
    } else {
        (10, body, false)
    };

    let digits = match digits.strip_prefix('_') {
        Some(rest) if prefixed => rest,
        Some(_) => return None,
        None => digits,
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || digits.starts_with(['+', '-'])
    {
        return None;
    }

    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => s.get(prefix.len()..),
        _ => None,
    }
}
