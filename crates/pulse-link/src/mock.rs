use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::sink;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::ServiceEndpoint;
use crate::error::TransportError;
use crate::transport::{Frame, Link, Transport};

/// What a scripted connect attempt does.
#[derive(Clone, Debug)]
pub enum MockConnect {
    /// Fail immediately with a connect error.
    Refuse(String),
    /// Never complete; only a connect timeout ends the attempt.
    Hang,
    /// Succeed and hand a [`MockPeer`] to the test.
    Accept,
}

/// Scripted transport for deterministic tests without sockets.
///
/// Each service has its own queue of [`MockConnect`] steps; once a queue is
/// empty the fallback applies (accept by default).
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<MockConnect>>>,
    fallback: MockConnect,
    peers: Mutex<VecDeque<MockPeer>>,
    connects: Mutex<HashMap<String, usize>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: MockConnect::Accept,
            peers: Mutex::new(VecDeque::new()),
            connects: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, service: &str, steps: Vec<MockConnect>) -> Self {
        self.scripts
            .lock()
            .insert(service.to_string(), steps.into_iter().collect());
        self
    }

    pub fn fallback(mut self, step: MockConnect) -> Self {
        self.fallback = step;
        self
    }

    /// Connect attempts made for `service` so far.
    pub fn connects(&self, service: &str) -> usize {
        self.connects.lock().get(service).copied().unwrap_or(0)
    }

    /// Oldest accepted connection for `service` not yet claimed by the test.
    pub fn take_peer(&self, service: &str) -> Option<MockPeer> {
        let mut peers = self.peers.lock();
        let idx = peers.iter().position(|p| p.endpoint.name.as_str() == service)?;
        peers.remove(idx)
    }

    fn next_step(&self, service: &str) -> MockConnect {
        self.scripts
            .lock()
            .get_mut(service)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &ServiceEndpoint) -> Result<Link, TransportError> {
        *self
            .connects
            .lock()
            .entry(endpoint.name.to_string())
            .or_default() += 1;

        match self.next_step(endpoint.name.as_str()) {
            MockConnect::Refuse(reason) => Err(TransportError::Connect(reason)),
            MockConnect::Hang => {
                futures::future::pending::<()>().await;
                Err(TransportError::Closed)
            }
            MockConnect::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel::<Frame>();

                let sink = sink::unfold(outbound, |tx, frame: Frame| async move {
                    tx.send(frame)
                        .map_err(|_| TransportError::Send("peer dropped".into()))?;
                    Ok::<_, TransportError>(tx)
                });
                let stream = UnboundedReceiverStream::new(inbound);

                self.peers.lock().push_back(MockPeer {
                    endpoint: endpoint.clone(),
                    to_client,
                    from_client,
                });
                Ok(Link {
                    sink: Box::pin(sink),
                    stream: Box::pin(stream),
                })
            }
        }
    }
}

/// Server side of an accepted mock connection. Dropping it ends the client's
/// stream without a close frame.
pub struct MockPeer {
    endpoint: ServiceEndpoint,
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MockPeer {
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.to_client.send(Ok(Frame::Text(text.to_string()))).is_ok()
    }

    pub fn send_json(&self, value: serde_json::Value) -> bool {
        self.send_text(&value.to_string())
    }

    pub fn close(&self, code: u16) -> bool {
        self.to_client.send(Ok(Frame::Close(Some(code)))).is_ok()
    }

    pub fn fail(&self, reason: &str) -> bool {
        self.to_client
            .send(Err(TransportError::Receive(reason.to_string())))
            .is_ok()
    }

    /// Frames the client has sent so far.
    pub fn sent(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};

    fn endpoint(name: &str) -> ServiceEndpoint {
        ServiceEndpoint::new(name, format!("ws://mock/{name}"))
    }

    #[tokio::test]
    async fn scripted_steps_then_fallback() {
        let mock = MockTransport::new()
            .script("claude", vec![MockConnect::Refuse("nope".into())])
            .fallback(MockConnect::Accept);

        let first = mock.connect(&endpoint("claude")).await;
        assert!(matches!(first, Err(TransportError::Connect(_))));
        assert!(mock.connect(&endpoint("claude")).await.is_ok());
        assert_eq!(mock.connects("claude"), 2);
        assert_eq!(mock.connects("codex"), 0);
    }

    #[tokio::test]
    async fn peer_and_client_exchange_frames() {
        let mock = MockTransport::new();
        let mut link = mock.connect(&endpoint("codex")).await.ok().unwrap();
        let mut peer = mock.take_peer("codex").unwrap();
        assert!(mock.take_peer("codex").is_none());
        assert_eq!(peer.endpoint().address, "ws://mock/codex");

        peer.send_text("hello");
        peer.close(1000);
        assert_eq!(link.stream.next().await.unwrap().unwrap(), Frame::Text("hello".into()));
        assert_eq!(link.stream.next().await.unwrap().unwrap(), Frame::Close(Some(1000)));

        link.sink.send(Frame::Text("ping".into())).await.unwrap();
        assert_eq!(peer.sent(), vec![Frame::Text("ping".into())]);
    }

    #[tokio::test]
    async fn dropped_peer_ends_stream() {
        let mock = MockTransport::new();
        let mut link = mock.connect(&endpoint("claude")).await.ok().unwrap();
        drop(mock.take_peer("claude"));
        assert!(link.stream.next().await.is_none());
        let err = link.sink.send(Frame::Text("x".into())).await.unwrap_err();
        assert_eq!(err.kind(), "send");
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_completes() {
        let mock = MockTransport::new().fallback(MockConnect::Hang);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            mock.connect(&endpoint("claude")),
        )
        .await;
        assert!(result.is_err());
    }
}
