//! Behavioral layer on top of queue negotiation.
//!
//! A single decision function dispatched on the behavior tag; interaction
//! histories live on the vehicle record, never globally.

use std::collections::BTreeMap;

use contracts::{Behavior, PeerAction, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Dispute,
}

/// Decides how a vehicle responds to an assignment with `queue_pos > 0`.
///
/// `opponent` is the vehicle holding the slot immediately above (or the slot
/// this vehicle wants). Tit-for-tat with no opponent, or no recorded
/// interaction with it, acts cooperatively.
pub fn decide(
    behavior: Behavior,
    queue_pos: u32,
    battery: f64,
    critical_threshold: f64,
    opponent: Option<VehicleId>,
    peer_history: &BTreeMap<VehicleId, Vec<PeerAction>>,
) -> Decision {
    if queue_pos == 0 {
        return Decision::Accept;
    }

    match behavior {
        Behavior::Cooperative => Decision::Accept,
        Behavior::Competitive => Decision::Dispute,
        Behavior::None => {
            if battery < critical_threshold {
                Decision::Dispute
            } else {
                Decision::Accept
            }
        }
        Behavior::TitForTat => {
            let Some(opponent) = opponent else {
                return Decision::Accept;
            };
            match peer_history.get(&opponent).and_then(|history| history.last()) {
                Some(PeerAction::Defect) => Decision::Dispute,
                Some(PeerAction::Cooperate) | None => Decision::Accept,
            }
        }
    }
}
