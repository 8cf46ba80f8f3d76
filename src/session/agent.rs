//! `Agent`: the reader/writer worker pair owned per connection. The
//! writer is a 4-way prioritized `select!` over kick, death, heartbeat
//! ticks, and the send queue, rather than a single channel receiver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};

use crate::codec::message::{Message, MessageType, Route};
use crate::codec::packet::{encode_packet, try_decode_packet, DecodeOutcome, Packet, PacketType};
use crate::session::command::CommandTable;
use crate::session::session::{now_unix, Session, SessionState};
use crate::session::transport::{TransportReader, TransportWriter};

/// An item accepted into the send queue:
/// `send(type, route, mid, payload, isError)`.
pub struct SendItem {
    pub message_type: MessageType,
    pub route: Option<Route>,
    pub id: Option<u64>,
    pub payload: Vec<u8>,
    pub error: bool,
}

/// Handle shared by the reader task, command handlers, and external
/// callers (`close`, `kick`, `send`). The writer task is the sole owner
/// of the transport; everything else only ever talks to it through these
/// channels.
pub struct AgentHandle {
    pub session: Arc<Session>,
    send_tx: mpsc::Sender<SendItem>,
    kick_tx: mpsc::UnboundedSender<(Vec<u8>, oneshot::Sender<()>)>,
    death: Arc<Notify>,
    close_lock: Arc<Mutex<()>>,
    dropped: Arc<AtomicU64>,
    max_packet_len: usize,
    on_close: Mutex<Vec<Box<dyn Fn(&Session) + Send + Sync>>>,
}

impl AgentHandle {
    /// Enqueues one outbound message. Drops with a warning, rather than
    /// blocking, when the session is `Closed` or the queue is at
    /// capacity: slow consumers lose messages rather than blocking
    /// writers.
    pub fn send(&self, item: SendItem) {
        if self.session.state() == SessionState::Closed {
            log::warn!("agent {}: dropping send, session closed", self.session.sid);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let Err(e) = self.send_tx.try_send(item) {
            log::warn!("agent {}: send queue full, dropping message: {e}", self.session.sid);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Registers a hook run once, synchronously, when the agent closes.
    /// Hooks added after the agent has already closed never run.
    pub fn on_close(&self, hook: impl Fn(&Session) + Send + Sync + 'static) {
        self.on_close.lock().expect("agent on-close hooks lock poisoned").push(Box::new(hook));
    }

    /// Idempotent, serialized by `close_lock`. Transitions
    /// the session to `Closed`, runs every registered on-close hook, then
    /// signals the death channel; the writer drains the queues and closes
    /// the transport after observing it.
    pub fn close(&self) {
        let _guard = self.close_lock.lock().expect("agent close lock poisoned");
        if self.session.state() == SessionState::Closed {
            return;
        }
        self.session.advance_state(SessionState::Closed);
        for hook in self.on_close.lock().expect("agent on-close hooks lock poisoned").iter() {
            hook(&self.session);
        }
        self.death.notify_waiters();
    }

    /// Writes `reason` as a `Kick` packet synchronously, bypassing the
    /// send/raw-write queues, then closes the agent.
    pub async fn kick(&self, reason: &[u8]) {
        let packet = Packet::new(PacketType::Kick, reason.to_vec());
        let bytes = encode_packet(&packet);
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.kick_tx.send((bytes, ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        self.close();
    }

    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len
    }
}

/// Spawns the reader and writer tasks for one accepted connection.
/// Returns the handle callers use to interact with it.
pub fn spawn(
    reader: Box<dyn TransportReader>,
    writer: Box<dyn TransportWriter>,
    session: Arc<Session>,
    commands: Arc<CommandTable>,
    heartbeat: Duration,
    write_backlog: usize,
    max_packet_len: usize,
) -> Arc<AgentHandle> {
    let (send_tx, send_rx) = mpsc::channel::<SendItem>(write_backlog);
    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (kick_tx, kick_rx) = mpsc::unbounded_channel::<(Vec<u8>, oneshot::Sender<()>)>();
    let death = Arc::new(Notify::new());

    let handle = Arc::new(AgentHandle {
        session: Arc::clone(&session),
        send_tx,
        kick_tx,
        death: Arc::clone(&death),
        close_lock: Arc::new(Mutex::new(())),
        dropped: Arc::new(AtomicU64::new(0)),
        max_packet_len,
        on_close: Mutex::new(Vec::new()),
    });

    tokio::spawn(writer_loop(writer, raw_tx, raw_rx, send_rx, kick_rx, death, Arc::clone(&session), heartbeat));
    tokio::spawn(reader_loop(reader, Arc::clone(&session), commands, Arc::clone(&handle), max_packet_len));

    handle
}

async fn writer_loop(
    mut writer: Box<dyn TransportWriter>,
    raw_tx: mpsc::UnboundedSender<Vec<u8>>,
    mut raw_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut send_rx: mpsc::Receiver<SendItem>,
    mut kick_rx: mpsc::UnboundedReceiver<(Vec<u8>, oneshot::Sender<()>)>,
    death: Arc<Notify>,
    session: Arc<Session>,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            biased;

            Some((bytes, ack)) = kick_rx.recv() => {
                let _ = writer.write_raw(bytes).await;
                let _ = ack.send(());
                break;
            }

            _ = death.notified() => break,

            _ = ticker.tick() => {
                let age = now_unix() - session.last_heartbeat_unix();
                if age > heartbeat.as_secs() as i64 {
                    log::warn!("agent {}: heartbeat timeout after {age}s", session.sid);
                    break;
                }
            }

            maybe_bytes = raw_rx.recv() => {
                match maybe_bytes {
                    Some(bytes) => {
                        if let Err(e) = writer.write_raw(bytes).await {
                            log::warn!("agent {}: write error, closing: {e}", session.sid);
                            break;
                        }
                    }
                    None => break,
                }
            }

            maybe_item = send_rx.recv() => {
                match maybe_item {
                    Some(item) => {
                        let message = Message {
                            message_type: item.message_type,
                            id: item.id,
                            route: item.route,
                            data: item.payload,
                            error: item.error,
                        };
                        let encoded = crate::codec::message::encode_message(&message);
                        let packet = Packet::new(PacketType::Data, encoded);
                        let _ = raw_tx.send(encode_packet(&packet));
                    }
                    None => break,
                }
            }
        }
    }

    session.advance_state(SessionState::Closed);
    writer.shutdown().await;
}

async fn reader_loop(
    mut reader: Box<dyn TransportReader>,
    session: Arc<Session>,
    commands: Arc<CommandTable>,
    handle: Arc<AgentHandle>,
    max_packet_len: usize,
) {
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        match reader.read_next().await {
            None => break,
            Some(Err(e)) => {
                log::warn!("agent {}: connection read error, closing: {e}", session.sid);
                break;
            }
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(&chunk);

                loop {
                    match try_decode_packet(&buffer, max_packet_len) {
                        Ok(DecodeOutcome::Decoded(packet, consumed)) => {
                            buffer.drain(..consumed);
                            dispatch(&packet, &session, &commands).await;
                            session.touch_heartbeat();
                        }
                        Ok(DecodeOutcome::Skipped(consumed)) => {
                            log::warn!("agent {}: skipping frame with unrecognized type", session.sid);
                            buffer.drain(..consumed);
                        }
                        Ok(DecodeOutcome::NeedMoreData) => break,
                        Err(e) => {
                            // an oversize frame terminates the
                            // connection (fatal), unlike an ordinary
                            // malformed-frame skip.
                            log::warn!("agent {}: fatal framing error, closing: {e}", session.sid);
                            handle.close();
                            return;
                        }
                    }
                }
            }
        }
    }

    handle.close();
}

async fn dispatch(packet: &Packet, session: &Arc<Session>, commands: &CommandTable) {
    match commands.get(packet.packet_type) {
        Some(command) => command.execute(session, packet).await,
        None => log::warn!("agent {}: no command for packet type {:?}", session.sid, packet.packet_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::BoxFuture;
    use std::sync::Mutex as StdMutex;

    /// In-memory `Transport` double: a reader fed by a channel, a writer
    /// that appends every write into a shared buffer callers can inspect.
    struct FakeReader {
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    impl TransportReader for FakeReader {
        fn read_next(&mut self) -> BoxFuture<'_, Option<Result<Vec<u8>, crate::error::CherryError>>> {
            Box::pin(async move { self.rx.recv().await.map(Ok) })
        }
    }

    struct FakeWriter {
        written: Arc<StdMutex<Vec<u8>>>,
    }

    impl TransportWriter for FakeWriter {
        fn write_raw(&mut self, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), crate::error::CherryError>> {
            Box::pin(async move {
                self.written.lock().unwrap().extend_from_slice(&bytes);
                Ok(())
            })
        }

        fn shutdown(&mut self) -> BoxFuture<'_, ()> {
            Box::pin(async move {})
        }
    }

    fn spawn_test_agent(heartbeat: Duration) -> (Arc<AgentHandle>, Arc<StdMutex<Vec<u8>>>, mpsc::UnboundedSender<Vec<u8>>) {
        spawn_test_agent_with_backlog(heartbeat, 16)
    }

    fn spawn_test_agent_with_backlog(
        heartbeat: Duration,
        write_backlog: usize,
    ) -> (Arc<AgentHandle>, Arc<StdMutex<Vec<u8>>>, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let written = Arc::new(StdMutex::new(Vec::new()));
        let session = Arc::new(Session::new(1));
        let commands = Arc::new(CommandTable::new());
        let handle = spawn(
            Box::new(FakeReader { rx }),
            Box::new(FakeWriter { written: Arc::clone(&written) }),
            session,
            commands,
            heartbeat,
            write_backlog,
            1024,
        );
        (handle, written, tx)
    }

    #[tokio::test]
    async fn send_queue_preserves_fifo_order_on_the_wire() {
        let (handle, written, _keep_alive) = spawn_test_agent(Duration::from_secs(60));

        for n in 0u64..3 {
            handle.send(SendItem {
                message_type: MessageType::Push,
                route: Some(Route::Inline("tick".into())),
                id: None,
                payload: n.to_be_bytes().to_vec(),
                error: false,
            });
        }

        let mut bytes = Vec::new();
        for _ in 0..100 {
            bytes = written.lock().unwrap().clone();
            if bytes.windows(8).any(|w| w == 2u64.to_be_bytes()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Each push's 8-byte big-endian counter appears in order within
        // the concatenated frame stream.
        let positions: Vec<usize> = (0u64..3)
            .map(|n| {
                let needle = n.to_be_bytes();
                bytes.windows(8).position(|w| w == needle).unwrap()
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn backlog_drop_increments_counter_without_blocking() {
        let (handle, _written, _keep_alive) = spawn_test_agent_with_backlog(Duration::from_secs(60), 2);

        for n in 0u64..10 {
            handle.send(SendItem {
                message_type: MessageType::Push,
                route: None,
                id: None,
                payload: n.to_be_bytes().to_vec(),
                error: false,
            });
        }

        assert!(handle.dropped_count() > 0);
    }

    #[tokio::test]
    async fn registered_on_close_hooks_run_when_agent_closes() {
        let (handle, _written, _keep_alive) = spawn_test_agent(Duration::from_secs(60));
        let observed = Arc::new(StdMutex::new(Vec::new()));
        let observed_in_hook = Arc::clone(&observed);
        handle.on_close(move |session| observed_in_hook.lock().unwrap().push(session.sid));

        handle.close();

        assert_eq!(*observed.lock().unwrap(), vec![handle.session.sid]);
    }

    #[tokio::test]
    async fn heartbeat_timeout_closes_the_session() {
        // Heartbeat timestamps are Unix-second granularity, so this
        // exercises real wall-clock time rather than tokio's mocked
        // clock; the margin is generous to avoid second-boundary flakes.
        let (handle, _written, _keep_alive) = spawn_test_agent(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(handle.session.state(), SessionState::Closed);
    }
}
