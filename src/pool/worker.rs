use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use super::PoolConfig;
use crate::{Connection, Result};

// respawn storms must hand the thread back to the runtime eventually
const MAX_RESPAWN_ROUNDS: usize = 32;

pub(crate) struct Handle {
    send: UnboundedSender<Message>,
}

impl Handle {
    pub fn new(config: PoolConfig) -> (Self, Supervisor) {
        let (send, recv) = mpsc::unbounded_channel();
        let boot_pending = config.size;
        (
            Self { send },
            Supervisor {
                config,
                recv,
                idle: VecDeque::new(),
                queue: VecDeque::with_capacity(1),
                connecting: Vec::new(),
                actives: 0,
                spawned: 0,
                boot_pending,
                boot_waiters: Vec::new(),
            },
        )
    }

    pub async fn acquire(&self) -> Result<Connection> {
        let (tx, rx) = oneshot::channel();
        self.send.send(Message::Acquire(tx)).expect("pool supervisor closed");
        rx.await.expect("pool supervisor closed")
    }

    pub fn release(&self, conn: Connection) {
        // a send failure means the supervisor is gone and the socket simply
        // closes with the connection
        let _ = self.send.send(Message::Release(conn));
    }

    pub async fn ready(&self) {
        let (tx, rx) = oneshot::channel();
        self.send.send(Message::Ready(tx)).expect("pool supervisor closed");
        rx.await.expect("pool supervisor closed");
    }

    pub async fn status(&self) -> PoolStatus {
        let (tx, rx) = oneshot::channel();
        self.send.send(Message::Status(tx)).expect("pool supervisor closed");
        rx.await.expect("pool supervisor closed")
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        Self { send: self.send.clone() }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PoolHandle")
    }
}

/// A point-in-time snapshot of the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Configured worker count.
    pub size: usize,
    /// Workers waiting for a caller.
    pub idle: usize,
    /// Workers currently checked out.
    pub busy: usize,
    /// Workers still running startup.
    pub connecting: usize,
    /// Callers suspended until a worker frees up.
    pub waiters: usize,
    /// Startup attempts over the pool lifetime, replacements included.
    pub spawned: u64,
}

type AcquireSend = oneshot::Sender<Result<Connection>>;

enum Message {
    Acquire(AcquireSend),
    Release(Connection),
    Ready(oneshot::Sender<()>),
    Status(oneshot::Sender<PoolStatus>),
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

/// The serializing agent owning all pool state.
///
/// Runs as one spawned task; acquire, release and startup completion are
/// processed strictly one at a time.
pub(crate) struct Supervisor {
    config: PoolConfig,
    recv: UnboundedReceiver<Message>,

    /// - acquire pops the front
    /// - release and finished startups go to a waiter first, idle otherwise
    idle: VecDeque<Connection>,
    queue: VecDeque<AcquireSend>,
    connecting: Vec<ConnectFuture>,

    /// live connections, checked out ones included
    actives: usize,
    spawned: u64,

    /// first-generation startups still unresolved; the pool reports ready
    /// once every initial worker finished startup or died and had its
    /// replacement spawned
    boot_pending: usize,
    boot_waiters: Vec<oneshot::Sender<()>>,
}

/// Hand a connection that is not yet in the idle queue to the longest
/// suspended waiter, skipping waiters that gave up. Never routes through
/// `idle` while a waiter exists, so a concurrent acquirer cannot steal a
/// directly handed-off worker.
fn hand_off(mut conn: Connection, queue: &mut VecDeque<AcquireSend>, idle: &mut VecDeque<Connection>) {
    while let Some(send) = queue.pop_front() {
        if let Err(Ok(_conn)) = send.send(Ok(conn)) {
            conn = _conn;
            continue;
        }

        return;
    }

    idle.push_back(conn);
}

impl Supervisor {
    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.config.size,
            idle: self.idle.len(),
            busy: self.actives - self.idle.len(),
            connecting: self.connecting.len(),
            waiters: self.queue.len(),
            spawned: self.spawned,
        }
    }
}

impl Future for Supervisor {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.as_mut().get_mut();

        for _round in 0..MAX_RESPAWN_ROUNDS {
            while let Poll::Ready(msg) = me.recv.poll_recv(cx) {
                let Some(msg) = msg else {
                    // all pool handles are dropped, every socket closes here
                    return Poll::Ready(());
                };

                match msg {
                    Message::Acquire(send) => match me.idle.pop_front() {
                        Some(conn) => {
                            if let Err(Ok(conn)) = send.send(Ok(conn)) {
                                me.idle.push_front(conn);
                            }
                        }
                        None => me.queue.push_back(send),
                    },
                    Message::Release(conn) => {
                        if conn.is_poisoned() {
                            tracing::error!(worker = %conn.id(), "worker died, spawning replacement");
                            me.actives -= 1;
                            drop(conn);
                        } else {
                            hand_off(conn, &mut me.queue, &mut me.idle);
                        }
                    }
                    Message::Ready(send) => {
                        if me.boot_pending == 0 {
                            let _ = send.send(());
                        } else {
                            me.boot_waiters.push(send);
                        }
                    }
                    Message::Status(send) => {
                        let _ = send.send(me.status());
                    }
                }
            }

            // replacements spawned below are pushed unpolled; loop so they
            // register with the waker before this task parks
            while me.actives + me.connecting.len() < me.config.size {
                me.spawned += 1;
                let config = me.config.conn.clone();
                me.connecting.push(Box::pin(async move {
                    Connection::connect_with(config).await.map_err(|e| e.context("worker startup"))
                }));
            }

            let mut resolved = false;
            let mut i = 0;
            while i < me.connecting.len() {
                match me.connecting[i].as_mut().poll(cx) {
                    Poll::Ready(result) => {
                        let _ = me.connecting.swap_remove(i);
                        resolved = true;
                        me.boot_pending = me.boot_pending.saturating_sub(1);
                        match result {
                            Ok(conn) => {
                                tracing::debug!(worker = %conn.id(), "worker ready");
                                me.actives += 1;
                                hand_off(conn, &mut me.queue, &mut me.idle);
                            }
                            Err(err) => {
                                tracing::error!("worker startup failed: {err}");
                                if let Some(send) = me.queue.pop_front() {
                                    let _ = send.send(Err(err));
                                }
                            }
                        }
                    }
                    Poll::Pending => i += 1,
                }
            }

            if me.boot_pending == 0 {
                for send in me.boot_waiters.drain(..) {
                    let _ = send.send(());
                }
            }

            if !resolved {
                return Poll::Pending;
            }
        }

        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
