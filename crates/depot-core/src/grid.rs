//! Static grid environment: cells, obstacles, charging stations, exit.
//!
//! The grid itself is immutable after construction. Station occupancy and
//! queues are mutable, owned by the world, and touched only from the
//! orchestrator's step slot.

use std::fmt;

use contracts::{Coord, StationId, StationSpec, VehicleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Obstacle,
    Station(StationId),
    Exit,
}

impl CellKind {
    pub fn is_walkable(self) -> bool {
        !matches!(self, Self::Obstacle)
    }
}

/// Mutable per-station bookkeeping. `occupants` and `queue` are disjoint;
/// queue index `i` corresponds to queue position `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingStation {
    pub id: StationId,
    pub coord: Coord,
    pub capacity: u32,
    pub occupants: Vec<VehicleId>,
    pub queue: Vec<VehicleId>,
}

impl ChargingStation {
    pub fn new(id: StationId, coord: Coord, capacity: u32) -> Self {
        Self {
            id,
            coord,
            capacity: capacity.max(1),
            occupants: Vec::new(),
            queue: Vec::new(),
        }
    }

    pub fn load(&self) -> u32 {
        (self.occupants.len() + self.queue.len()) as u32
    }

    pub fn has_free_slot(&self) -> bool {
        (self.occupants.len() as u32) < self.capacity
    }
}

impl fmt::Display for ChargingStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station {} at {} ({}/{} occupied, {} queued)",
            self.id,
            self.coord,
            self.occupants.len(),
            self.capacity,
            self.queue.len()
        )
    }
}

/// Neighbor probe order: north, east, south, west. Fixed because planner
/// tie-breaking depends on it.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<CellKind>,
    exit: Coord,
}

impl Grid {
    /// Builds a grid from ASCII rows (`.` walkable, `#` obstacle) and places
    /// stations and the exit from the scenario lists. Returns the grid plus
    /// the initial station records.
    pub fn from_ascii(
        map: &[String],
        stations: &[StationSpec],
        exit: Coord,
    ) -> Result<(Self, Vec<ChargingStation>), GridError> {
        if map.is_empty() || map[0].is_empty() {
            return Err(GridError::EmptyMap);
        }
        let height = map.len() as i32;
        let width = map[0].len() as i32;

        let mut cells = Vec::with_capacity((width * height) as usize);
        for (y, row) in map.iter().enumerate() {
            if row.len() as i32 != width {
                return Err(GridError::RaggedRow { row: y });
            }
            for (x, ch) in row.chars().enumerate() {
                let kind = match ch {
                    '.' => CellKind::Empty,
                    '#' => CellKind::Obstacle,
                    other => {
                        return Err(GridError::UnknownCell {
                            ch: other,
                            coord: Coord::new(x as i32, y as i32),
                        })
                    }
                };
                cells.push(kind);
            }
        }

        let mut grid = Self {
            width,
            height,
            cells,
            exit,
        };

        let mut records = Vec::with_capacity(stations.len());
        for (index, spec) in stations.iter().enumerate() {
            let id = index as StationId;
            if !grid.in_bounds(spec.coord) {
                return Err(GridError::StationOutOfBounds {
                    id,
                    coord: spec.coord,
                });
            }
            if grid.kind_at(spec.coord) != CellKind::Empty {
                return Err(GridError::StationNotPlaceable {
                    id,
                    coord: spec.coord,
                });
            }
            let idx = grid.index(spec.coord);
            grid.cells[idx] = CellKind::Station(id);
            records.push(ChargingStation::new(id, spec.coord, spec.capacity));
        }

        if !grid.in_bounds(exit) {
            return Err(GridError::ExitOutOfBounds { coord: exit });
        }
        if grid.kind_at(exit) != CellKind::Empty {
            return Err(GridError::ExitNotPlaceable { coord: exit });
        }
        let idx = grid.index(exit);
        grid.cells[idx] = CellKind::Exit;

        Ok((grid, records))
    }

    fn index(&self, coord: Coord) -> usize {
        (coord.y * self.width + coord.x) as usize
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn exit(&self) -> Coord {
        self.exit
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x >= 0 && coord.x < self.width && coord.y >= 0 && coord.y < self.height
    }

    pub fn kind_at(&self, coord: Coord) -> CellKind {
        self.cells[self.index(coord)]
    }

    pub fn is_walkable(&self, coord: Coord) -> bool {
        self.in_bounds(coord) && self.kind_at(coord).is_walkable()
    }

    pub fn station_id_at(&self, coord: Coord) -> Option<StationId> {
        if !self.in_bounds(coord) {
            return None;
        }
        match self.kind_at(coord) {
            CellKind::Station(id) => Some(id),
            _ => None,
        }
    }

    /// Walkable 4-neighbors in the fixed probe order.
    pub fn neighbors4(&self, coord: Coord) -> Vec<Coord> {
        NEIGHBOR_OFFSETS
            .iter()
            .map(|(dx, dy)| Coord::new(coord.x + dx, coord.y + dy))
            .filter(|&next| self.is_walkable(next))
            .collect()
    }

    pub fn obstacles(&self) -> Vec<Coord> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let coord = Coord::new(x, y);
                if self.kind_at(coord) == CellKind::Obstacle {
                    out.push(coord);
                }
            }
        }
        out
    }

    /// ASCII render with vehicle positions overlaid, one string per row.
    pub fn render_ascii(&self, vehicle_positions: &[(VehicleId, Coord)]) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.height as usize);
        for y in 0..self.height {
            let mut row = String::with_capacity(self.width as usize);
            for x in 0..self.width {
                let coord = Coord::new(x, y);
                let occupied = vehicle_positions.iter().any(|(_, c)| *c == coord);
                let ch = if occupied {
                    'V'
                } else {
                    match self.kind_at(coord) {
                        CellKind::Empty => '.',
                        CellKind::Obstacle => '#',
                        CellKind::Station(_) => 'C',
                        CellKind::Exit => 'E',
                    }
                };
                row.push(ch);
            }
            rows.push(row);
        }
        rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    EmptyMap,
    RaggedRow { row: usize },
    UnknownCell { ch: char, coord: Coord },
    StationOutOfBounds { id: StationId, coord: Coord },
    StationNotPlaceable { id: StationId, coord: Coord },
    ExitOutOfBounds { coord: Coord },
    ExitNotPlaceable { coord: Coord },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMap => write!(f, "map has no cells"),
            Self::RaggedRow { row } => write!(f, "map row {row} has a different width"),
            Self::UnknownCell { ch, coord } => {
                write!(f, "unknown map character {ch:?} at {coord}")
            }
            Self::StationOutOfBounds { id, coord } => {
                write!(f, "station {id} at {coord} is out of bounds")
            }
            Self::StationNotPlaceable { id, coord } => {
                write!(f, "station {id} at {coord} does not sit on an empty cell")
            }
            Self::ExitOutOfBounds { coord } => write!(f, "exit at {coord} is out of bounds"),
            Self::ExitNotPlaceable { coord } => {
                write!(f, "exit at {coord} does not sit on an empty cell")
            }
        }
    }
}

impl std::error::Error for GridError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(rows: &[&str]) -> Vec<String> {
        rows.iter().map(|r| r.to_string()).collect()
    }

    fn small_grid() -> (Grid, Vec<ChargingStation>) {
        Grid::from_ascii(
            &rows(&["....", ".#..", "...."]),
            &[StationSpec {
                coord: Coord::new(3, 2),
                capacity: 2,
            }],
            Coord::new(0, 2),
        )
        .expect("valid grid")
    }

    #[test]
    fn parses_map_and_places_features() {
        let (grid, stations) = small_grid();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.height(), 3);
        assert!(!grid.is_walkable(Coord::new(1, 1)));
        assert_eq!(grid.station_id_at(Coord::new(3, 2)), Some(0));
        assert_eq!(grid.kind_at(Coord::new(0, 2)), CellKind::Exit);
        assert_eq!(stations[0].capacity, 2);
    }

    #[test]
    fn station_and_exit_cells_are_walkable() {
        let (grid, _) = small_grid();
        assert!(grid.is_walkable(Coord::new(3, 2)));
        assert!(grid.is_walkable(grid.exit()));
    }

    #[test]
    fn neighbors_follow_fixed_probe_order() {
        let (grid, _) = small_grid();
        // From (1, 0): north (1, 1) is an obstacle, so east, then west.
        assert_eq!(
            grid.neighbors4(Coord::new(1, 0)),
            vec![Coord::new(2, 0), Coord::new(0, 0)]
        );
        // Interior cell keeps N, E, S, W ordering.
        assert_eq!(
            grid.neighbors4(Coord::new(2, 1)),
            vec![
                Coord::new(2, 2),
                Coord::new(3, 1),
                Coord::new(2, 0),
            ]
        );
    }

    #[test]
    fn rejects_station_on_obstacle() {
        let err = Grid::from_ascii(
            &rows(&["..", ".#"]),
            &[StationSpec {
                coord: Coord::new(1, 1),
                capacity: 1,
            }],
            Coord::new(0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, GridError::StationNotPlaceable { id: 0, .. }));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = Grid::from_ascii(&rows(&[".x"]), &[], Coord::new(0, 0)).unwrap_err();
        assert!(matches!(err, GridError::UnknownCell { ch: 'x', .. }));
    }

    #[test]
    fn render_overlays_vehicles() {
        let (grid, _) = small_grid();
        let render = grid.render_ascii(&[(0, Coord::new(2, 0))]);
        assert_eq!(render, vec!["..V.", ".#..", "E..C"]);
    }
}
