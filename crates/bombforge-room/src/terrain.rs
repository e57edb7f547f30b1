//! Terrain: the tile grid a match is played on.
//!
//! Generated once per room and only ever mutated by explosions turning
//! destructible blocks into floor.

use bombforge_protocol::{Position, Tile, TileGrid};
use rand::Rng;

use crate::RoomError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terrain {
    width: i32,
    height: i32,
    /// `cells[y][x]`
    cells: Vec<Vec<Tile>>,
}

impl Terrain {
    /// Generates a fresh grid.
    ///
    /// - perimeter cells are walls
    /// - interior cells at even (x, y) are wall pillars
    /// - every other interior cell becomes a block with `block_probability`,
    ///   except cells within one step (diagonals included) of a spawn
    ///   corner, which stay floor
    pub fn generate<R: Rng + ?Sized>(
        width: i32,
        height: i32,
        block_probability: f64,
        rng: &mut R,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let p = if block_probability.is_finite() {
            block_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let corners = spawn_corners(width, height);

        let cells = (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| {
                        let pos = Position::new(x, y);
                        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                            Tile::Wall
                        } else if x % 2 == 0 && y % 2 == 0 {
                            Tile::Wall
                        } else if corners.iter().any(|c| c.chebyshev(pos) <= 1) {
                            Tile::Floor
                        } else if rng.random_bool(p) {
                            Tile::Block
                        } else {
                            Tile::Floor
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            width,
            height,
            cells,
        }
    }

    /// Builds terrain from explicit rows (`rows[y][x]`).
    pub fn from_rows(rows: Vec<Vec<Tile>>) -> Result<Self, RoomError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(RoomError::InvalidTerrain("terrain has no cells".into()));
        }
        if let Some(y) = rows.iter().position(|row| row.len() != width) {
            return Err(RoomError::InvalidTerrain(format!(
                "row {y} has {} cells, expected {width}",
                rows[y].len()
            )));
        }
        let (Ok(w), Ok(h)) = (i32::try_from(width), i32::try_from(height)) else {
            return Err(RoomError::InvalidTerrain("terrain too large".into()));
        };
        Ok(Self {
            width: w,
            height: h,
            cells: rows,
        })
    }

    /// Builds terrain from a picture: `#` wall, `+` block, anything else
    /// floor.
    ///
    /// ```text
    /// #####
    /// #.+.#
    /// #####
    /// ```
    pub fn from_ascii(rows: &[&str]) -> Result<Self, RoomError> {
        Self::from_rows(
            rows.iter()
                .map(|row| {
                    row.chars()
                        .map(|c| match c {
                            '#' => Tile::Wall,
                            '+' => Tile::Block,
                            _ => Tile::Floor,
                        })
                        .collect()
                })
                .collect(),
        )
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    /// The tile at `pos`, or `None` outside the grid.
    pub fn get(&self, pos: Position) -> Option<Tile> {
        if !self.in_bounds(pos) {
            return None;
        }
        let (x, y) = (pos.x as usize, pos.y as usize);
        Some(self.cells[y][x])
    }

    /// Overwrites the tile at `pos`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, pos: Position, tile: Tile) {
        if self.in_bounds(pos) {
            self.cells[pos.y as usize][pos.x as usize] = tile;
        }
    }

    /// Only floor can be walked on; walls and blocks both stop movement.
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.get(pos) == Some(Tile::Floor)
    }

    /// Where the `index`-th player to join spawns: the four corners in
    /// order, then the centre for everyone after that.
    pub fn spawn_for(&self, index: usize) -> Position {
        spawn_corners(self.width, self.height)
            .get(index)
            .copied()
            .unwrap_or(Position::new(self.width / 2, self.height / 2))
    }

    pub fn snapshot(&self) -> TileGrid {
        self.cells.clone()
    }
}

/// Top-left, top-right, bottom-left, bottom-right.
fn spawn_corners(width: i32, height: i32) -> [Position; 4] {
    [
        Position::new(1, 1),
        Position::new(width - 2, 1),
        Position::new(1, height - 2),
        Position::new(width - 2, height - 2),
    ]
}
