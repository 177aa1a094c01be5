pub mod commands;
pub mod console;

use anyhow::{anyhow, Context};
use camino::Utf8PathBuf;
use clap::ValueEnum;
use directories::ProjectDirs;
use parkdash_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER};
use parkdash_core::protocol::CommandType;
use parkdash_core::ActionType;
use parkdash_persistence::PARKDASH_REDB_FILENAME;

#[derive(ValueEnum, Clone, Debug, Copy)]
pub enum CliCommand {
    Pause,
    Resume,
    Reset,
    Homing,
    Move,
}

impl From<CliCommand> for CommandType {
    fn from(c: CliCommand) -> Self {
        match c {
            CliCommand::Pause => CommandType::Pause,
            CliCommand::Resume => CommandType::Resume,
            CliCommand::Reset => CommandType::Reset,
            CliCommand::Homing => CommandType::Homing,
            CliCommand::Move => CommandType::Move,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Copy)]
pub enum CliAction {
    In,
    Out,
}

impl From<CliAction> for ActionType {
    fn from(a: CliAction) -> Self {
        match a {
            CliAction::In => ActionType::In,
            CliAction::Out => ActionType::Out,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Copy, Default)]
pub enum CliAckPolicy {
    #[default]
    All,
    Known,
}

impl From<CliAckPolicy> for parkdash_app_core::AckPolicy {
    fn from(p: CliAckPolicy) -> Self {
        match p {
            CliAckPolicy::All => parkdash_app_core::AckPolicy::AllParsed,
            CliAckPolicy::Known => parkdash_app_core::AckPolicy::KnownOnly,
        }
    }
}

/// Accepts `AB:12:CD:34`, `0xAB12CD34` or a decimal card number.
pub fn parse_uid(raw: &str) -> anyhow::Result<u32> {
    let raw = raw.trim();
    if raw.contains(':') {
        let hex: String = raw.split(':').collect();
        return u32::from_str_radix(&hex, 16).with_context(|| format!("invalid uid '{raw}'"));
    }
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).with_context(|| format!("invalid uid '{raw}'"));
    }
    raw.parse().with_context(|| format!("invalid uid '{raw}'"))
}

/// Snapshot file used when none is given on the command line.
pub fn default_snapshot_path() -> anyhow::Result<Utf8PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    let dir = Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf())
        .map_err(|p| anyhow!("data directory is not UTF-8: {}", p.display()))?;
    Ok(dir.join(PARKDASH_REDB_FILENAME))
}
