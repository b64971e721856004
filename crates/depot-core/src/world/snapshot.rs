use contracts::{
    Coord, GridSnapshot, Snapshot, StationSnapshot, VehicleId, VehicleSnapshot, SCHEMA_VERSION_V1,
};

use super::FleetWorld;

impl FleetWorld {
    /// Read-only view of the whole simulation at the current tick boundary.
    /// Snapshots are only taken between ticks, so they are always atomic.
    pub fn snapshot_for_current_tick(&self) -> Snapshot {
        let tick = self.status.current_tick;

        // Completed vehicles have left the board; stranded ones stay visible.
        let occupied: Vec<(VehicleId, Coord)> = self
            .vehicles
            .values()
            .filter(|vehicle| vehicle.state != contracts::VehicleState::Completed)
            .map(|vehicle| (vehicle.id, vehicle.coord))
            .collect();

        let vehicles = self
            .vehicles
            .values()
            .map(|vehicle| VehicleSnapshot {
                id: vehicle.id,
                coord: vehicle.coord,
                battery: vehicle.battery,
                state: vehicle.state,
                behavior: vehicle.behavior,
                path_remainder: vehicle.path.iter().copied().collect(),
                trail: vehicle.trail.iter().copied().collect(),
                station_id: vehicle.assigned_station,
                queue_pos: vehicle.queue_pos,
            })
            .collect();

        let stations = self
            .stations
            .iter()
            .map(|station| StationSnapshot {
                id: station.id,
                coord: station.coord,
                capacity: station.capacity,
                occupants: station.occupants.clone(),
                queue: station.queue.clone(),
            })
            .collect();

        Snapshot {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.status.run_id.clone(),
            tick,
            snapshot_id: format!("snap_{tick:06}"),
            world_state_hash: format!("{:016x}", self.state_hash),
            grid: GridSnapshot {
                width: self.grid.width(),
                height: self.grid.height(),
                obstacles: self.grid.obstacles(),
                exit: self.grid.exit(),
                render: self.grid.render_ascii(&occupied),
            },
            vehicles,
            stations,
            recent_log: self.log.recent(),
            metrics: self.metrics.summary(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_for_current_tick()
    }
}
