//! curvefs-csi: provisioning and mounting helpers for a CurveFS CSI driver
//!
//! The heavy lifting is done by two external programs: the management tool
//! (`curvefs_tool`) creates and deletes filesystems, and the FUSE client
//! (`curve-fuse`) mounts them. This crate validates storage-class parameters,
//! builds deterministic command lines for those programs, and prepares a
//! per-mount client config.
//!
//! # Architecture
//!
//! - **Parameters**: storage-class `key -> value` maps validated into typed
//!   values and ordered flag lists.
//! - **Tool invoker** ([`tool::FsTool`]): `create-fs` / `delete-fs`.
//! - **Mount invoker** ([`mount::FuseMounter`]): mount, unmount and bounded
//!   cleanup of per-mount files.
//! - **Config patcher** ([`conf`]): applies mount flags to a copy of the
//!   client config and namespaces cache directories per mount.
//! - **Command runner** ([`exec::CommandRunner`]): seam between the invokers
//!   and real processes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use curvefs_csi::config::DriverConfig;
//! use curvefs_csi::exec::SystemRunner;
//! use curvefs_csi::tool::FsTool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::from_file(&"config.yaml".into())?;
//! let tool = FsTool::new(config.tool.clone(), Arc::new(SystemRunner));
//!
//! let params = [("mdsAddr", "10.0.0.1:6700"), ("fsType", "volume"),
//!     ("backendVolName", "pool"), ("backendVolSizeGB", "20")]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//! tool.create_fs("pvc-1", 10 << 30, &params).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod conf;
pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod mount;
pub mod params;
pub mod tool;

pub use error::{Code, CsiError, Result};
