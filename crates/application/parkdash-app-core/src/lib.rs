pub mod actions;
pub mod bus;
pub mod connection;
pub mod kernel;
pub mod ports;
pub mod reducer;
pub mod renderer;
pub mod store;
pub mod transport;
pub mod viewmodel;

pub use actions::{ActionReceipt, ActionService};
pub use bus::{BusEvent, EventBus, Handler};
pub use connection::{
    AckPolicy, Backoff, ConnectionManager, ConnectionState, SendOutcome, SyncCursor,
};
pub use kernel::Dashboard;
pub use ports::*;
pub use reducer::{NewRecord, RecordPatch};
pub use renderer::{
    Easing, ProgressElement, ProgressStyle, ReconciliationRenderer, RenderOp, RenderPlan,
    RenderedRow, StatusCell,
};
pub use store::{AppState, ReactiveStore, StateKey, StatePatch, StateValue, Subscription};
pub use transport::{HttpActions, WsConnector};
pub use viewmodel::*;
