//! Filesystem management through `curvefs_tool`

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ToolConfig;
use crate::error::Result;
use crate::exec::{redact, run_checked, CommandRunner};
use crate::params::{
    require_mds_addr, FlagList, FsType, Params, PARAM_ENABLE_SUM_IN_DIR, PARAM_TOOL_CONF_PATH,
};

/// Creates and deletes filesystems by shelling out to the management tool
pub struct FsTool {
    config: ToolConfig,
    runner: Arc<dyn CommandRunner>,
}

impl FsTool {
    pub fn new(config: ToolConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Create filesystem `volume_id`.
    ///
    /// The tool has no notion of a quota yet, so `capacity_bytes` is only logged.
    pub async fn create_fs(
        &self,
        volume_id: &str,
        capacity_bytes: i64,
        params: &Params,
    ) -> Result<()> {
        let flags = self.create_fs_flags(volume_id, params)?;
        debug!(
            "create-fs {} requested capacity {} bytes",
            volume_id, capacity_bytes
        );
        self.run_subcommand("create-fs", &flags).await
    }

    /// Delete filesystem `volume_id` without interactive confirmation
    pub async fn delete_fs(&self, volume_id: &str, params: &Params) -> Result<()> {
        let flags = self.delete_fs_flags(volume_id, params)?;
        self.run_subcommand("delete-fs", &flags).await
    }

    /// Validate parameters and build the ordered `create-fs` flags
    pub fn create_fs_flags(&self, volume_id: &str, params: &Params) -> Result<FlagList> {
        let mut flags = self.common_flags(params)?;
        let fs_type = FsType::from_params(params)?;

        flags.set("fsType", fs_type.name());
        flags.set(
            "enableSumInDir",
            params
                .get(PARAM_ENABLE_SUM_IN_DIR)
                .map(String::as_str)
                .unwrap_or("0"),
        );
        fs_type.append_tool_flags(&mut flags);
        flags.set("fsName", volume_id);
        Ok(flags)
    }

    /// Validate parameters and build the ordered `delete-fs` flags
    pub fn delete_fs_flags(&self, volume_id: &str, params: &Params) -> Result<FlagList> {
        let mut flags = self.common_flags(params)?;
        flags.set("fsName", volume_id);
        flags.set("noconfirm", "1");
        Ok(flags)
    }

    fn common_flags(&self, params: &Params) -> Result<FlagList> {
        let mut flags = FlagList::new();
        flags.set("mdsAddr", require_mds_addr(params)?);
        flags.set(
            "confPath",
            params
                .get(PARAM_TOOL_CONF_PATH)
                .map(String::as_str)
                .unwrap_or(self.config.conf_path.as_str()),
        );
        Ok(flags)
    }

    async fn run_subcommand(&self, subcommand: &str, flags: &FlagList) -> Result<()> {
        let mut args = vec![subcommand.to_string()];
        args.extend(flags.to_dash_args());

        info!("curvefs_tool {}: {:?}", subcommand, redact(&args));
        run_checked(
            self.runner.as_ref(),
            &format!("curvefs_tool {}", subcommand),
            &self.config.binary,
            &args,
        )
        .await?;
        info!("curvefs_tool {} succeeded", subcommand);
        Ok(())
    }
}
