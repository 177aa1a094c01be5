use parkdash_core::ActionType;
use parkdash_infra::{ActionRequest, HttpActionClient, WsSink, WsStream, WsTransport};

use crate::ports::{ActionPort, Connector, FrameSink, FrameStream};

/// [`Connector`] over a real WebSocket.
#[derive(Debug, Default, Clone)]
pub struct WsConnector {
    transport: WsTransport,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(
        &self,
        endpoint: &str,
    ) -> anyhow::Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let (sink, stream) = self.transport.connect(endpoint).await?;
        Ok((Box::new(sink), Box::new(stream)))
    }
}

#[async_trait::async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> anyhow::Result<()> {
        self.send_text(frame).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        WsSink::close(self).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FrameStream for WsStream {
    async fn next(&mut self) -> Option<anyhow::Result<String>> {
        self.next_text().await.map(|r| r.map_err(Into::into))
    }
}

/// [`ActionPort`] posting to the controller's REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpActions {
    client: HttpActionClient,
}

impl HttpActions {
    pub fn new(client: HttpActionClient) -> Self {
        Self { client }
    }

    pub fn for_host(host: &str) -> anyhow::Result<Self> {
        let client = HttpActionClient::new(parkdash_infra::action_url(host))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl ActionPort for HttpActions {
    async fn post_action(&self, uid: u32, action: ActionType, sid: u8) -> anyhow::Result<()> {
        self.client
            .post_action(&ActionRequest { uid, action, sid })
            .await?;
        Ok(())
    }
}
