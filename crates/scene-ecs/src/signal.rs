//! Lifecycle signals - synchronous multicast notification points.
//!
//! Every component type owns three signals (construct, update, destroy).
//! Handlers run in-line, on the caller's stack, with mutable access to the
//! registry, so they may create and destroy entities, add and remove
//! components, or connect and disconnect handlers while a dispatch is running.
//!
//! Dispatch works from a snapshot of the handler list taken when it starts:
//!
//! - a handler connected during dispatch is not invoked by that dispatch;
//! - a handler disconnected (or blocked) before its turn is skipped.

use std::{cell::Cell, fmt, rc::Rc};

use smallvec::SmallVec;

use crate::{entity::Entity, registry::Registry};

/// Which lifecycle event a signal reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A component was added to an entity.
    Construct,
    /// A component was replaced or patched.
    Update,
    /// A component is about to leave an entity (still readable).
    Destroy,
}

/// Unique identifier for a connection within one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Type-erased handler.
pub(crate) type Handler = Rc<dyn Fn(&mut Registry, Entity)>;

/// Shared state of one connection, observed by both the signal and the
/// [`Connection`] handle.
#[derive(Debug)]
struct ConnectionState {
    id: ConnectionId,
    connected: Cell<bool>,
    blocks: Cell<u32>,
}

impl ConnectionState {
    fn is_active(&self) -> bool {
        self.connected.get() && self.blocks.get() == 0
    }
}

/// Handle to a connected handler.
///
/// Dropping the handle does not disconnect; call [`Connection::disconnect`].
#[derive(Clone)]
pub struct Connection {
    state: Rc<ConnectionState>,
}

impl Connection {
    /// The connection's ID within its signal.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.state.id
    }

    /// Disconnect the handler. Takes effect immediately, even mid-dispatch.
    pub fn disconnect(&self) {
        self.state.connected.set(false);
    }

    /// Whether the handler is still connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.connected.get()
    }

    /// Whether at least one [`ScopedBlock`] is held for this connection.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.state.blocks.get() > 0
    }

    /// Suppress the handler until the returned guard is dropped.
    ///
    /// Blocks nest; the handler resumes when the last guard goes away. The
    /// guard releases on unwind as well.
    #[must_use = "the block is released as soon as the guard is dropped"]
    pub fn block(&self) -> ScopedBlock {
        self.state.blocks.set(self.state.blocks.get() + 1);
        ScopedBlock {
            state: Rc::clone(&self.state),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.state.id)
            .field("connected", &self.state.connected.get())
            .field("blocks", &self.state.blocks.get())
            .finish()
    }
}

/// Guard returned by [`Connection::block`].
pub struct ScopedBlock {
    state: Rc<ConnectionState>,
}

impl Drop for ScopedBlock {
    fn drop(&mut self) {
        self.state.blocks.set(self.state.blocks.get() - 1);
    }
}

impl fmt::Debug for ScopedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBlock")
            .field("connection", &self.state.id)
            .finish()
    }
}

/// One registered handler.
#[derive(Clone)]
pub(crate) struct Slot {
    state: Rc<ConnectionState>,
    handler: Handler,
}

impl Slot {
    pub(crate) fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Snapshot of a signal's handlers taken at the start of a dispatch.
pub(crate) type Snapshot = SmallVec<[Slot; 4]>;

/// An ordered list of handlers for one `(component type, kind)` pair.
#[derive(Default)]
pub struct Signal {
    slots: Vec<Slot>,
    next_id: u32,
}

impl Signal {
    /// Create a signal with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a handler. Handlers run in connection order.
    pub fn connect<F>(&mut self, handler: F) -> Connection
    where
        F: Fn(&mut Registry, Entity) + 'static,
    {
        self.connect_cyclic(move |_| handler)
    }

    /// Connect a handler built from its own [`Connection`].
    ///
    /// This lets a handler block or disconnect itself, e.g. to suppress
    /// re-entry while it performs work that would fire the same signal.
    pub fn connect_cyclic<F, B>(&mut self, build: B) -> Connection
    where
        B: FnOnce(&Connection) -> F,
        F: Fn(&mut Registry, Entity) + 'static,
    {
        self.prune();

        let state = Rc::new(ConnectionState {
            id: ConnectionId(self.next_id),
            connected: Cell::new(true),
            blocks: Cell::new(0),
        });
        self.next_id += 1;

        let connection = Connection {
            state: Rc::clone(&state),
        };
        let handler: Handler = Rc::new(build(&connection));
        self.slots.push(Slot { state, handler });
        connection
    }

    /// Disconnect every handler.
    pub fn disconnect_all(&mut self) {
        for slot in self.slots.drain(..) {
            slot.state.connected.set(false);
        }
    }

    /// Number of connected handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state.connected.get())
            .count()
    }

    /// Whether no handler is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the current handlers for a dispatch pass.
    pub(crate) fn snapshot(&mut self) -> Snapshot {
        self.prune();
        self.slots.iter().cloned().collect()
    }

    fn prune(&mut self) {
        self.slots.retain(|slot| slot.state.connected.get());
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.len())
            .finish()
    }
}

/// The three lifecycle signals of one component type.
#[derive(Default, Debug)]
pub struct Signals {
    construct: Signal,
    update: Signal,
    destroy: Signal,
}

impl Signals {
    /// Borrow the signal for `kind`.
    #[must_use]
    pub fn get(&self, kind: SignalKind) -> &Signal {
        match kind {
            SignalKind::Construct => &self.construct,
            SignalKind::Update => &self.update,
            SignalKind::Destroy => &self.destroy,
        }
    }

    /// Mutably borrow the signal for `kind`.
    pub fn get_mut(&mut self, kind: SignalKind) -> &mut Signal {
        match kind {
            SignalKind::Construct => &mut self.construct,
            SignalKind::Update => &mut self.update,
            SignalKind::Destroy => &mut self.destroy,
        }
    }
}
