//! One connection and the emitter operations on it.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use emitprims_frame::{decode_packet, encode_packet, is_reserved, FrameError, Packet};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::EmitterConfig;
use crate::error::{AckError, AckOutcome, Result, SparkError};
use crate::ledger::AckLedger;
use crate::router::{Dispatch, EventRouter, Handler};
use crate::transport::FrameSink;

type CloseHook = Box<dyn FnOnce(&str) + Send + 'static>;

/// Handle to one open connection.
///
/// Owns the connection's ack ledger and listener table. Clones share the
/// same connection. Listeners and ack callbacks always run without any
/// internal lock held, so they may call back into the spark.
#[derive(Clone)]
pub struct Spark {
    inner: Arc<SparkInner>,
}

struct SparkInner {
    id: String,
    config: EmitterConfig,
    sink: Box<dyn FrameSink>,
    state: Mutex<SparkState>,
    expiry: Condvar,
}

struct SparkState {
    open: bool,
    ledger: AckLedger,
    router: EventRouter,
    close_hooks: Vec<CloseHook>,
    timer_running: bool,
}

impl SparkInner {
    fn lock(&self) -> MutexGuard<'_, SparkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Spark {
    /// Wrap an outgoing sink into a new open connection.
    pub fn new(id: impl Into<String>, sink: impl FrameSink + 'static, config: EmitterConfig) -> Self {
        let id = id.into();
        debug!(spark = %id, "spark opened");
        Self {
            inner: Arc::new(SparkInner {
                id,
                config,
                sink: Box::new(sink),
                state: Mutex::new(SparkState {
                    open: true,
                    ledger: AckLedger::new(),
                    router: EventRouter::new(),
                    close_hooks: Vec::new(),
                    timer_running: false,
                }),
                expiry: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.inner.config
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Number of acknowledgments still waiting for a reply.
    pub fn pending_acks(&self) -> usize {
        self.inner.lock().ledger.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.lock().router.listener_count(event)
    }

    /// True if both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Spark) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakSpark {
        WeakSpark {
            id: self.inner.id.clone(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Emit an event without asking for an acknowledgment.
    pub fn send(&self, event: &str, args: Vec<Value>) -> Result<()> {
        check_event_name(event)?;
        self.ensure_open()?;
        self.transmit(&Packet::event(event, args))
    }

    /// Emit an event and register `callback` for the peer's reply, using the
    /// configured ack timeout.
    ///
    /// Returns the ack id embedded in the packet.
    pub fn send_with_ack<F>(&self, event: &str, args: Vec<Value>, callback: F) -> Result<u64>
    where
        F: FnOnce(AckOutcome) + Send + 'static,
    {
        self.send_with_ack_timeout(event, args, self.inner.config.ack_timeout, callback)
    }

    /// Emit an event with an explicit ack window (`None` waits until reply
    /// or close).
    ///
    /// Once this returns `Ok`, `callback` runs exactly once: with the reply,
    /// with [`AckError::Timeout`], or with [`AckError::ConnectionClosed`]. If
    /// it returns an error other than a transport failure, the callback is
    /// dropped without running.
    pub fn send_with_ack_timeout<F>(
        &self,
        event: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<u64>
    where
        F: FnOnce(AckOutcome) + Send + 'static,
    {
        check_event_name(event)?;

        // Register, encode and arm the timer under one lock so the timer
        // never sees an entry whose packet failed to encode.
        let (ack_id, frame) = {
            let mut state = self.inner.lock();
            if !state.open {
                return Err(SparkError::Closed(self.inner.id.clone()));
            }
            let ack_id = state
                .ledger
                .register(Box::new(callback), timeout, Instant::now());
            let frame = match self.encode(&Packet::with_ack(event, args, ack_id)) {
                Ok(frame) => frame,
                Err(err) => {
                    let unsent = state.ledger.take(ack_id);
                    drop(state);
                    drop(unsent);
                    return Err(err);
                }
            };
            if state.ledger.deadline_of(ack_id).is_some() {
                self.ensure_timer(&mut state);
            }
            (ack_id, frame)
        };

        trace!(spark = %self.inner.id, event, ack_id, "sending with ack");
        self.write_frame(frame)?;
        Ok(ack_id)
    }

    /// Emit an event and hand back a receiver for the acknowledgment.
    pub fn request(&self, event: &str, args: Vec<Value>) -> Result<AckReceiver> {
        let (tx, rx) = mpsc::channel();
        self.send_with_ack(event, args, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        Ok(AckReceiver { rx })
    }

    /// Register a listener for `event`. Listeners run in registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> Result<()>
    where
        F: Fn(&[Value], Option<Reply>) + Send + Sync + 'static,
    {
        self.on_handler(event, Arc::new(handler))
    }

    /// Register an already shared listener.
    pub fn on_handler(&self, event: &str, handler: Handler) -> Result<()> {
        let mut state = self.inner.lock();
        if !state.open {
            return Err(SparkError::Closed(self.inner.id.clone()));
        }
        state.router.on(event, handler)
    }

    /// Remove all listeners for `event`.
    pub fn off(&self, event: &str) -> usize {
        self.inner.lock().router.off(event)
    }

    /// Run `hook` once the connection closes. Runs immediately if it already
    /// has.
    pub fn on_close<F>(&self, hook: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.open {
            state.close_hooks.push(Box::new(hook));
            return;
        }
        drop(state);
        hook(&self.inner.id);
    }

    /// Deliver one framed packet received from the transport.
    ///
    /// `frame` must hold exactly one frame.
    pub fn receive_frame(&self, frame: &[u8]) -> Result<()> {
        let mut buf = BytesMut::from(frame);
        let packet = decode_packet(&mut buf, self.inner.config.max_payload_size)?
            .ok_or(FrameError::Truncated(frame.len()))?;
        if !buf.is_empty() {
            return Err(FrameError::TrailingBytes(buf.len()).into());
        }
        self.receive_packet(packet);
        Ok(())
    }

    /// Route one decoded packet: ack replies settle the ledger, everything
    /// else goes to the listeners registered under its event name.
    pub fn receive_packet(&self, packet: Packet) {
        let dispatch = {
            let state = self.inner.lock();
            if !state.open {
                trace!(spark = %self.inner.id, event = %packet.event, "dropping packet on closed spark");
                return;
            }
            state.router.dispatch(&packet)
        };

        match dispatch {
            Dispatch::Ack(reply) => {
                let entry = self.inner.lock().ledger.take(reply.ack_id);
                match entry {
                    Some(entry) => {
                        trace!(spark = %self.inner.id, ack_id = reply.ack_id, "ack resolved");
                        entry.resolve(reply.into_outcome());
                    }
                    None => {
                        debug!(spark = %self.inner.id, ack_id = reply.ack_id, "reply for unknown ack id dropped");
                    }
                }
            }
            Dispatch::Listeners(handlers) => {
                trace!(
                    spark = %self.inner.id,
                    event = %packet.event,
                    listeners = handlers.len(),
                    ack = ?packet.ack,
                    "dispatching"
                );
                for handler in handlers {
                    if !self.is_open() {
                        break;
                    }
                    let reply = packet.ack.map(|ack_id| Reply {
                        ack_id,
                        spark: self.downgrade(),
                    });
                    handler(&packet.args, reply);
                }
            }
            Dispatch::Dropped(reason) => {
                trace!(spark = %self.inner.id, event = %packet.event, ?reason, "packet dropped");
            }
        }
    }

    /// Tear the connection down.
    ///
    /// Every pending acknowledgment fails with
    /// [`AckError::ConnectionClosed`], listeners are discarded, and close
    /// hooks run. Closing twice is a no-op.
    pub fn close(&self) {
        let (pending, hooks) = {
            let mut state = self.inner.lock();
            if !state.open {
                return;
            }
            state.open = false;
            state.router.clear();
            (
                state.ledger.drain(),
                std::mem::take(&mut state.close_hooks),
            )
        };
        self.inner.expiry.notify_all();
        self.inner.sink.close();
        debug!(spark = %self.inner.id, pending = pending.len(), "spark closed");

        for entry in pending {
            entry.invalidate();
        }
        for hook in hooks {
            hook(&self.inner.id);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SparkError::Closed(self.inner.id.clone()))
        }
    }

    fn encode(&self, packet: &Packet) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_packet(packet, &mut buf, self.inner.config.max_payload_size)?;
        Ok(buf.freeze())
    }

    fn transmit(&self, packet: &Packet) -> Result<()> {
        let frame = self.encode(packet)?;
        trace!(spark = %self.inner.id, event = %packet.event, "sending");
        self.write_frame(frame)
    }

    // A failed write leaves the stream in an unknown state, so the whole
    // connection goes down with it.
    fn write_frame(&self, frame: Bytes) -> Result<()> {
        if let Err(err) = self.inner.sink.send_frame(frame) {
            warn!(spark = %self.inner.id, error = %err, "transport write failed, closing spark");
            self.close();
            return Err(err);
        }
        Ok(())
    }

    fn ensure_timer(&self, state: &mut SparkState) {
        if state.timer_running {
            self.inner.expiry.notify_all();
            return;
        }

        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name(format!("emitprims-ack-{}", self.inner.id))
            .spawn(move || run_expiry(inner));
        match spawned {
            Ok(_) => state.timer_running = true,
            Err(err) => {
                warn!(spark = %self.inner.id, error = %err, "failed to start ack timer; timeouts disabled until close")
            }
        }
    }
}

/// Expire timed-out acknowledgments until none with a deadline remain or
/// the spark closes.
fn run_expiry(inner: Arc<SparkInner>) {
    let mut state = inner.lock();
    loop {
        if !state.open {
            break;
        }

        let now = Instant::now();
        let expired = state.ledger.expire_due(now);
        if !expired.is_empty() {
            drop(state);
            for entry in expired {
                debug!(spark = %inner.id, ack_id = entry.id(), "ack timed out");
                entry.expire();
            }
            state = inner.lock();
            continue;
        }

        let Some(deadline) = state.ledger.next_deadline() else {
            break;
        };
        let wait = deadline.saturating_duration_since(now);
        state = match inner.expiry.wait_timeout(state, wait) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
    state.timer_running = false;
}

fn check_event_name(event: &str) -> Result<()> {
    if is_reserved(event) {
        return Err(SparkError::InvalidEventName(event.to_string()));
    }
    Ok(())
}

impl fmt::Debug for Spark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spark")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Non-owning handle to a spark.
#[derive(Clone)]
pub struct WeakSpark {
    id: String,
    inner: Weak<SparkInner>,
}

impl WeakSpark {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn upgrade(&self) -> Option<Spark> {
        self.inner.upgrade().map(|inner| Spark { inner })
    }
}

impl fmt::Debug for WeakSpark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSpark").field("id", &self.id).finish()
    }
}

/// One-shot reply capability handed to a listener when the sender asked for
/// an acknowledgment.
///
/// Sending consumes the reply. Dropping it without sending leaves the
/// sender to its timeout or to connection close.
#[derive(Debug)]
pub struct Reply {
    ack_id: u64,
    spark: WeakSpark,
}

impl Reply {
    pub fn ack_id(&self) -> u64 {
        self.ack_id
    }

    /// Reply with a success value (`Ok`) or an error value (`Err`).
    ///
    /// `Err(Value::Null)` is refused with [`SparkError::NullErrorReply`]
    /// because the sender would read it as success; the reply is spent.
    pub fn send(self, outcome: std::result::Result<Value, Value>) -> Result<()> {
        if matches!(outcome, Err(Value::Null)) {
            return Err(SparkError::NullErrorReply);
        }
        let spark = self
            .spark
            .upgrade()
            .ok_or_else(|| SparkError::Closed(self.spark.id.clone()))?;
        spark.ensure_open()?;
        spark.transmit(&Packet::ack_reply(self.ack_id, outcome))
    }

    pub fn ok(self, result: impl Into<Value>) -> Result<()> {
        self.send(Ok(result.into()))
    }

    pub fn err(self, error: impl Into<Value>) -> Result<()> {
        self.send(Err(error.into()))
    }
}

/// Receiving end of [`Spark::request`].
#[derive(Debug)]
pub struct AckReceiver {
    rx: Receiver<AckOutcome>,
}

impl AckReceiver {
    /// Block until the acknowledgment settles.
    pub fn wait(self) -> AckOutcome {
        self.rx.recv().unwrap_or(Err(AckError::ConnectionClosed))
    }

    /// Block for at most `timeout`.
    ///
    /// Giving up here does not cancel the pending entry; a late reply is
    /// discarded.
    pub fn wait_timeout(self, timeout: Duration) -> AckOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(AckError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(AckError::ConnectionClosed),
        }
    }

    /// Non-blocking check.
    pub fn try_recv(&self) -> Option<AckOutcome> {
        self.rx.try_recv().ok()
    }
}
