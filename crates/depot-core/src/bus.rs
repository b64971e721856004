//! Tick-local typed message bus.
//!
//! Messages append to per-recipient inboxes during a tick and are drained at
//! the consumer's step. Delivery order inside an inbox is (sender, emission
//! order), which keeps every consumer's view deterministic.

use std::collections::BTreeMap;

use contracts::{AgentMessage, VehicleId};

/// Bus addresses. The orchestrator sorts before any vehicle, though in
/// practice each inbox only ever mixes senders of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Address {
    Orchestrator,
    Vehicle(VehicleId),
}

#[derive(Debug, Clone)]
struct Envelope {
    sender: Address,
    seq: u64,
    message: AgentMessage,
}

#[derive(Debug, Default)]
pub struct MessageBus {
    inboxes: BTreeMap<Address, Vec<Envelope>>,
    next_seq: u64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, sender: Address, to: Address, message: AgentMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inboxes.entry(to).or_default().push(Envelope {
            sender,
            seq,
            message,
        });
    }

    /// Empties the recipient's inbox, sorted by (sender, emission order).
    pub fn drain(&mut self, recipient: Address) -> Vec<AgentMessage> {
        let Some(mut envelopes) = self.inboxes.remove(&recipient) else {
            return Vec::new();
        };
        envelopes.sort_by_key(|envelope| (envelope.sender, envelope.seq));
        envelopes.into_iter().map(|envelope| envelope.message).collect()
    }

    pub fn pending(&self, recipient: Address) -> usize {
        self.inboxes.get(&recipient).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Coord, VehicleState};

    fn status(vehicle_id: VehicleId, tick: u64) -> AgentMessage {
        AgentMessage::StatusUpdate {
            vehicle_id,
            coord: Coord::new(0, 0),
            battery: 50.0,
            state: VehicleState::Idle,
            tick,
        }
    }

    #[test]
    fn drains_in_sender_then_emission_order() {
        let mut bus = MessageBus::new();
        bus.send(Address::Vehicle(2), Address::Orchestrator, status(2, 1));
        bus.send(Address::Vehicle(0), Address::Orchestrator, status(0, 1));
        bus.send(Address::Vehicle(2), Address::Orchestrator, status(2, 2));
        bus.send(Address::Vehicle(1), Address::Orchestrator, status(1, 1));

        let drained = bus.drain(Address::Orchestrator);
        let senders: Vec<VehicleId> = drained
            .iter()
            .map(|message| match message {
                AgentMessage::StatusUpdate { vehicle_id, .. } => *vehicle_id,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(senders, vec![0, 1, 2, 2]);
    }

    #[test]
    fn drain_empties_the_inbox() {
        let mut bus = MessageBus::new();
        bus.send(Address::Vehicle(0), Address::Orchestrator, status(0, 1));
        assert_eq!(bus.pending(Address::Orchestrator), 1);

        assert_eq!(bus.drain(Address::Orchestrator).len(), 1);
        assert_eq!(bus.pending(Address::Orchestrator), 0);
        assert!(bus.drain(Address::Orchestrator).is_empty());
    }

    #[test]
    fn inboxes_are_isolated_per_recipient() {
        let mut bus = MessageBus::new();
        bus.send(Address::Orchestrator, Address::Vehicle(0), status(0, 1));
        bus.send(Address::Orchestrator, Address::Vehicle(1), status(1, 1));

        assert_eq!(bus.drain(Address::Vehicle(0)).len(), 1);
        assert_eq!(bus.pending(Address::Vehicle(1)), 1);
    }
}
