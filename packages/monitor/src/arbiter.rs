//! Message-passing tunnel backend.
//!
//! A single arbiter thread owns the [`SharedState`]. Actors never touch the
//! state directly. They send requests over a channel, and blocking entry
//! requests wait on a reply channel of their own. Each time a departure
//! changes the state, the arbiter re-scans its queue of pending entries and
//! grants every one whose predicate now holds.

use std::{collections::VecDeque, io, thread};

use flume::{Receiver, Sender};

use crate::{Direction, PriorityRule, SharedState, TrafficClass, Tunnel};

const DISCONNECTED: &str = "Tunnel arbiter disconnected";

#[derive(Debug)]
enum Request {
    Enter {
        class: TrafficClass,
        reply: Sender<()>,
    },
    Leave {
        class: TrafficClass,
    },
    Snapshot {
        reply: Sender<SharedState>,
    },
}

/// The arbiter thread's owned state.
#[derive(Debug)]
pub struct Arbiter {
    rule: PriorityRule,
    state: SharedState,
    pending: VecDeque<(TrafficClass, Sender<()>)>,
}

impl Arbiter {
    /// Starts the arbiter thread and returns a handle to it.
    ///
    /// The thread exits once every [`ArbiterHandle`] has been dropped.
    ///
    /// # Errors
    ///
    /// * If the OS fails to spawn the arbiter thread
    pub fn spawn(rule: PriorityRule) -> io::Result<ArbiterHandle> {
        let (tx, rx) = flume::unbounded();
        let arbiter = Self {
            rule,
            state: SharedState::default(),
            pending: VecDeque::new(),
        };

        thread::Builder::new()
            .name("tunnel-arbiter".to_string())
            .spawn(move || arbiter.run(&rx))?;

        Ok(ArbiterHandle { sender: tx })
    }

    fn run(mut self, requests: &Receiver<Request>) {
        log::debug!("run: arbiter started");

        while let Ok(request) = requests.recv() {
            self.handle(request);
        }

        if !self.pending.is_empty() {
            log::warn!(
                "run: arbiter stopping with {} pending entries",
                self.pending.len()
            );
        }
        log::debug!("run: arbiter stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Enter { class, reply } => {
                self.state.record_operation();
                self.state.begin_wait(class);

                if self.state.can_enter(class) {
                    self.grant(class, &reply);
                } else {
                    log::debug!(
                        "handle: {class} waiting (crossing={:?} turn={})",
                        self.state.crossing(),
                        self.state.turn()
                    );
                    self.pending.push_back((class, reply));
                }
            }
            Request::Leave { class } => {
                self.state.record_operation();

                if self.state.depart(class, self.rule).is_some() {
                    self.rescan();
                }
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    fn grant(&mut self, class: TrafficClass, reply: &Sender<()>) {
        self.state.admit(class);

        if reply.send(()).is_err() {
            log::error!("grant: {class} requester is gone, revoking entry");
            self.state.revoke(class);
            return;
        }

        log::debug!(
            "grant: {class} granted ({} crossing)",
            self.state.crossing()[class]
        );
    }

    /// Grants pending entries in arrival order, re-evaluating after each
    /// grant since one admission can close the tunnel to other classes.
    fn rescan(&mut self) {
        let mut index = 0;

        while index < self.pending.len() {
            let class = self.pending[index].0;

            if self.state.can_enter(class) {
                if let Some((class, reply)) = self.pending.remove(index) {
                    self.grant(class, &reply);
                }
            } else {
                index += 1;
            }
        }
    }
}

/// Cloneable handle used by actors to talk to the arbiter thread.
///
/// The arbiter thread going away forfeits every guarantee the tunnel makes,
/// so all operations panic once the channel is disconnected.
#[derive(Debug, Clone)]
pub struct ArbiterHandle {
    sender: Sender<Request>,
}

impl ArbiterHandle {
    fn send(&self, request: Request) {
        self.sender.send(request).expect(DISCONNECTED);
    }

    /// Blocks until `class` is granted entry.
    ///
    /// # Panics
    ///
    /// * If the arbiter thread is gone
    pub fn enter(&self, class: TrafficClass) {
        let (reply, granted) = flume::bounded(1);
        self.send(Request::Enter { class, reply });
        granted.recv().expect(DISCONNECTED);
    }

    /// # Panics
    ///
    /// * If the arbiter thread is gone
    pub fn leave(&self, class: TrafficClass) {
        self.send(Request::Leave { class });
    }

    /// # Panics
    ///
    /// * If the arbiter thread is gone
    #[must_use]
    pub fn snapshot(&self) -> SharedState {
        let (reply, snapshot) = flume::bounded(1);
        self.send(Request::Snapshot { reply });
        snapshot.recv().expect(DISCONNECTED)
    }
}

impl Tunnel for ArbiterHandle {
    fn enter_car(&self, direction: Direction) {
        self.enter(direction.into());
    }

    fn leave_car(&self, direction: Direction) {
        self.leave(direction.into());
    }

    fn enter_pedestrian(&self) {
        self.enter(TrafficClass::Pedestrian);
    }

    fn leave_pedestrian(&self) {
        self.leave(TrafficClass::Pedestrian);
    }

    fn snapshot(&self) -> SharedState {
        Self::snapshot(self)
    }
}
