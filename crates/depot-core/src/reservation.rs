//! Spatial-temporal reservation table: one vehicle per (tick, cell).
//!
//! Reservations resolve head-on and swap conflicts the same-tick priority
//! rule cannot see, and let later-stepping vehicles plan around the claims
//! of earlier ones.

use std::collections::BTreeMap;

use contracts::{Coord, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationConflict {
    pub tick: u64,
    pub coord: Coord,
    pub held_by: VehicleId,
}

#[derive(Debug, Default, Clone)]
pub struct ReservationTable {
    by_slot: BTreeMap<(u64, Coord), VehicleId>,
    by_vehicle: BTreeMap<VehicleId, Vec<(u64, Coord)>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `coord` at `tick`. Re-reserving an own slot is a no-op.
    pub fn reserve(
        &mut self,
        vehicle: VehicleId,
        tick: u64,
        coord: Coord,
    ) -> Result<(), ReservationConflict> {
        match self.by_slot.get(&(tick, coord)) {
            Some(&held_by) if held_by != vehicle => Err(ReservationConflict {
                tick,
                coord,
                held_by,
            }),
            Some(_) => Ok(()),
            None => {
                self.by_slot.insert((tick, coord), vehicle);
                self.by_vehicle.entry(vehicle).or_default().push((tick, coord));
                Ok(())
            }
        }
    }

    /// Reserves `path[0]` at `first_tick`, `path[1]` at `first_tick + 1`, and
    /// so on. Rolls the whole claim back on the first conflict.
    pub fn reserve_path(
        &mut self,
        vehicle: VehicleId,
        first_tick: u64,
        path: &[Coord],
    ) -> Result<(), ReservationConflict> {
        let mut claimed: Vec<(u64, Coord)> = Vec::with_capacity(path.len());
        for (offset, &coord) in path.iter().enumerate() {
            let tick = first_tick + offset as u64;
            let already_ours = self.by_slot.get(&(tick, coord)) == Some(&vehicle);
            match self.reserve(vehicle, tick, coord) {
                Ok(()) => {
                    if !already_ours {
                        claimed.push((tick, coord));
                    }
                }
                Err(conflict) => {
                    for (tick, coord) in claimed {
                        self.release(vehicle, tick, coord);
                    }
                    return Err(conflict);
                }
            }
        }
        Ok(())
    }

    pub fn is_reserved(&self, tick: u64, coord: Coord) -> Option<VehicleId> {
        self.by_slot.get(&(tick, coord)).copied()
    }

    fn release(&mut self, vehicle: VehicleId, tick: u64, coord: Coord) {
        if self.by_slot.get(&(tick, coord)) == Some(&vehicle) {
            self.by_slot.remove(&(tick, coord));
        }
        if let Some(slots) = self.by_vehicle.get_mut(&vehicle) {
            slots.retain(|&slot| slot != (tick, coord));
            if slots.is_empty() {
                self.by_vehicle.remove(&vehicle);
            }
        }
    }

    /// Drops every claim held by `vehicle`. Used before each replan.
    pub fn clear_vehicle(&mut self, vehicle: VehicleId) {
        if let Some(slots) = self.by_vehicle.remove(&vehicle) {
            for (tick, coord) in slots {
                if self.by_slot.get(&(tick, coord)) == Some(&vehicle) {
                    self.by_slot.remove(&(tick, coord));
                }
            }
        }
    }

    /// Forgets all claims strictly before `current_tick`.
    pub fn gc(&mut self, current_tick: u64) {
        self.by_slot = self.by_slot.split_off(&(current_tick, Coord::new(i32::MIN, i32::MIN)));
        for slots in self.by_vehicle.values_mut() {
            slots.retain(|&(tick, _)| tick >= current_tick);
        }
        self.by_vehicle.retain(|_, slots| !slots.is_empty());
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    /// Claims held by `vehicle`, ordered by tick.
    pub fn slots_for(&self, vehicle: VehicleId) -> Vec<(u64, Coord)> {
        let mut slots = self
            .by_vehicle
            .get(&vehicle)
            .cloned()
            .unwrap_or_default();
        slots.sort_unstable();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_detects_conflicts() {
        let mut table = ReservationTable::new();
        table.reserve(0, 5, Coord::new(2, 2)).expect("free slot");
        // Own re-reservation is fine.
        table.reserve(0, 5, Coord::new(2, 2)).expect("own slot");

        let conflict = table.reserve(1, 5, Coord::new(2, 2)).unwrap_err();
        assert_eq!(conflict.held_by, 0);
        // A different tick on the same cell is free.
        table.reserve(1, 6, Coord::new(2, 2)).expect("next tick");
    }

    #[test]
    fn reserve_path_rolls_back_on_conflict() {
        let mut table = ReservationTable::new();
        table.reserve(7, 12, Coord::new(2, 0)).expect("blocker");

        let path = [Coord::new(0, 0), Coord::new(1, 0), Coord::new(2, 0)];
        let conflict = table.reserve_path(3, 10, &path).unwrap_err();
        assert_eq!(conflict.tick, 12);
        assert_eq!(conflict.held_by, 7);

        assert_eq!(table.is_reserved(10, Coord::new(0, 0)), None);
        assert_eq!(table.is_reserved(11, Coord::new(1, 0)), None);
        assert!(table.slots_for(3).is_empty());
    }

    #[test]
    fn clear_vehicle_releases_only_that_vehicle() {
        let mut table = ReservationTable::new();
        table
            .reserve_path(1, 4, &[Coord::new(0, 0), Coord::new(0, 1)])
            .expect("path");
        table.reserve(2, 4, Coord::new(5, 5)).expect("other");

        table.clear_vehicle(1);
        assert_eq!(table.is_reserved(4, Coord::new(0, 0)), None);
        assert_eq!(table.is_reserved(4, Coord::new(5, 5)), Some(2));
    }

    #[test]
    fn gc_drops_past_ticks() {
        let mut table = ReservationTable::new();
        table.reserve(0, 3, Coord::new(1, 1)).expect("past");
        table.reserve(0, 9, Coord::new(1, 2)).expect("future");

        table.gc(5);
        assert_eq!(table.is_reserved(3, Coord::new(1, 1)), None);
        assert_eq!(table.is_reserved(9, Coord::new(1, 2)), Some(0));
        assert_eq!(table.slots_for(0), vec![(9, Coord::new(1, 2))]);
    }
}
