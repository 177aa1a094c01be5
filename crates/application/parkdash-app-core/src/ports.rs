use parkdash_core::{ActionType, RecordKey};

use crate::connection::ConnectionState;
use crate::renderer::{ProgressStyle, RenderPlan};
use crate::viewmodel::{SlotTileVm, StatusBarVm};

/// Writing half of an open connection.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Reading half of an open connection. `None` means the peer closed it.
#[async_trait::async_trait]
pub trait FrameStream: Send {
    async fn next(&mut self) -> Option<anyhow::Result<String>>;
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(
        &self,
        endpoint: &str,
    ) -> anyhow::Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

#[async_trait::async_trait]
pub trait ActionPort: Send + Sync + 'static {
    async fn post_action(&self, uid: u32, action: ActionType, sid: u8) -> anyhow::Result<()>;
}

/// Whatever draws the dashboard. Calls arrive on the thread that changed the
/// state and must not block.
pub trait RenderSurface: Send + Sync + 'static {
    fn apply_history(&self, plan: &RenderPlan);

    fn progress(&self, _key: &RecordKey, _style: &ProgressStyle) {}

    fn slots(&self, _tiles: &[SlotTileVm]) {}

    fn status_bar(&self, _vm: &StatusBarVm) {}

    fn connection(&self, _state: ConnectionState) {}
}
