//! Cargo proxy: watch and edit the cargo of one planet

use crate::session::{CargoError, CargoHold, CargoKind, PlanetId, Session};
use game_link_core::Result;
use game_link_dispatch::{
    Dispatcher, Downlink, RequestReceiver, RequestSender, Signal, SignalConnection, SlaveHandle, SlaveObject,
    SlaveSender, WaitIndicator,
};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Snapshot of a planet's cargo as seen by the UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoStatus {
    /// Planet being observed
    pub planet: PlanetId,

    /// Planet name; empty if the planet does not exist
    pub name: String,

    pub cargo: CargoHold,

    /// Outcome of the most recent mutator, if it was rejected
    pub last_error: Option<CargoError>,

    /// Generation of the `set_planet` call this snapshot answers
    pub generation: u64,
}

/// Worker-side half of a [`CargoProxy`]
struct Trampoline {
    reply: RequestSender<Listener>,
    planet: PlanetId,
    generation: u64,
    connection: Option<SignalConnection>,
    last_error: Option<CargoError>,
    last_sent: Option<CargoStatus>,
}

impl Trampoline {
    fn new(reply: RequestSender<Listener>, planet: PlanetId) -> Self {
        Self {
            reply,
            planet,
            generation: 0,
            connection: None,
            last_error: None,
            last_sent: None,
        }
    }

    fn snapshot(&self, session: &Session) -> CargoStatus {
        let (name, cargo) = match session.planet(self.planet) {
            Some(planet) => (planet.name.clone(), planet.cargo.clone()),
            None => (String::new(), CargoHold::default()),
        };
        CargoStatus {
            planet: self.planet,
            name,
            cargo,
            last_error: self.last_error.clone(),
            generation: self.generation,
        }
    }

    /// Post the current status back to the UI. Unforced sends are skipped if
    /// nothing changed since the last one.
    fn send_status(&mut self, session: &Session, force: bool) {
        let status = self.snapshot(session);
        if !force && self.last_sent.as_ref() == Some(&status) {
            return;
        }
        self.last_sent = Some(status.clone());
        self.reply.post_new_request(move |listener| listener.receive(status));
    }

    fn on_planet_change(&mut self, session: &Session, planet: PlanetId) {
        if planet == self.planet {
            self.send_status(session, false);
        }
    }

    fn apply(&mut self, session: &mut Session, outcome: std::result::Result<(), CargoError>) {
        self.last_error = outcome.err();
        self.send_status(session, true);
    }
}

impl SlaveObject<Session> for Trampoline {
    fn init(&mut self, session: &mut Session, handle: SlaveHandle<Session, Self>) {
        self.connection = Some(session.sig_planet_change.add(move |planet: &PlanetId| {
            let planet = *planet;
            handle.post_new_request(move |session, trampoline| trampoline.on_planet_change(session, planet));
        }));
        if session.planet(self.planet).is_none() {
            self.last_error = Some(CargoError::UnknownPlanet(self.planet));
        }
        self.send_status(session, true);
    }

    fn done(&mut self, session: &mut Session) {
        if let Some(connection) = self.connection.take() {
            session.sig_planet_change.remove(connection);
        }
        debug!("Cargo trampoline for planet {} done", self.planet);
    }
}

/// UI-side receiver of status replies
struct Listener {
    /// Latest generation requested; shared with the proxy so that switching
    /// planets never needs the listener itself
    generation: Rc<Cell<u64>>,
    status: Option<CargoStatus>,
    sig_change: Signal<CargoStatus>,
}

impl Listener {
    fn new(generation: Rc<Cell<u64>>) -> Self {
        Self {
            generation,
            status: None,
            sig_change: Signal::new(),
        }
    }

    fn receive(&mut self, status: CargoStatus) {
        let current = self.generation.get();
        if status.generation < current {
            debug!(
                "Dropping stale cargo status (generation {} < {})",
                status.generation, current
            );
            return;
        }
        self.sig_change.raise(&status);
        self.status = Some(status);
    }
}

/// UI-side facade for the cargo of one planet.
///
/// Mutators return immediately; their outcome arrives as a [`CargoStatus`]
/// through the handlers registered with [`on_change`](Self::on_change), which
/// run when the UI thread's event loop dispatches. The proxy also refreshes
/// whenever anything else changes the observed planet.
///
/// A proxy belongs to the thread that created it and cannot be cloned.
/// Dropping it detaches its trampoline on the worker thread.
pub struct CargoProxy {
    trampoline: SlaveSender<Session, Trampoline>,
    reply: RequestReceiver<Listener>,
    generation: Rc<Cell<u64>>,
}

impl CargoProxy {
    /// Create a proxy observing `planet`, replying on `dispatcher`.
    ///
    /// `dispatcher` must belong to the current thread.
    pub fn new(session: &RequestSender<Session>, dispatcher: Arc<dyn Dispatcher>, planet: PlanetId) -> Self {
        let generation = Rc::new(Cell::new(0));
        let reply = RequestReceiver::new(dispatcher, Listener::new(generation.clone()));
        let reply_sender = reply.sender();
        let trampoline = SlaveSender::new(session, move |_: &mut Session| Trampoline::new(reply_sender, planet));
        Self {
            trampoline,
            reply,
            generation,
        }
    }

    /// Register a handler for status updates.
    ///
    /// Handlers run inside the proxy's reply dispatch. They may call the
    /// mutators and `set_planet`, but not `on_change`, `disconnect` or
    /// `last_status`, which need the listener the handler is running in.
    pub fn on_change(&self, handler: impl FnMut(&CargoStatus) + 'static) -> SignalConnection {
        self.reply.with_object(|listener| listener.sig_change.add(handler))
    }

    pub fn disconnect(&self, connection: SignalConnection) -> bool {
        self.reply.with_object(|listener| listener.sig_change.remove(connection))
    }

    /// Most recent status received on this thread
    pub fn last_status(&self) -> Option<CargoStatus> {
        self.reply.with_object(|listener| listener.status.clone())
    }

    /// Observe a different planet. Replies still in flight for the previous
    /// planet are ignored.
    pub fn set_planet(&self, planet: PlanetId) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        self.trampoline.post_new_request(move |session, trampoline| {
            trampoline.planet = planet;
            trampoline.generation = generation;
            trampoline.last_error = session
                .planet(planet)
                .is_none()
                .then_some(CargoError::UnknownPlanet(planet));
            trampoline.send_status(session, true);
        });
    }

    /// Load (`amount > 0`) or unload (`amount < 0`) cargo on the observed planet
    pub fn add_cargo(&self, kind: CargoKind, amount: i64) {
        self.trampoline.post_new_request(move |session, trampoline| {
            let outcome = session.add_cargo(trampoline.planet, kind, amount).map(|_| ());
            trampoline.apply(session, outcome);
        });
    }

    /// Move cargo from the observed planet to `to`
    pub fn transfer(&self, to: PlanetId, kind: CargoKind, amount: i64) {
        self.trampoline.post_new_request(move |session, trampoline| {
            let outcome = session.transfer(trampoline.planet, to, kind, amount);
            trampoline.apply(session, outcome);
        });
    }

    /// Read the current status synchronously
    pub fn get_status<W: WaitIndicator + ?Sized>(&self, link: &Downlink<'_, W>) -> Result<CargoStatus> {
        link.call_slave(&self.trampoline, |session, trampoline| trampoline.snapshot(session))
    }
}
