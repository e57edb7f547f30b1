//! The per-tick simulation step and the explosion algorithm.

use std::time::Instant;

use bombforge_protocol::{BombId, Direction, MatchState, Position, Recipient, ServerEvent, Tile};

use crate::config::MIN_PLAYERS_TO_START;
use crate::room::RoomInner;
use crate::{Outbox, StepOutcome, Terrain};

/// Cells hit by a bomb at `origin` with the given `range`.
///
/// The origin comes first, then each direction in [`Direction::ALL`] order.
/// Walls stop the blast and are not hit. Blocks are hit, turned into
/// floor, and stop the blast. Floor is hit and the blast carries on.
pub fn blast_set(terrain: &mut Terrain, origin: Position, range: u32) -> Vec<Position> {
    let range = i32::try_from(range).unwrap_or(i32::MAX);
    let mut cells = vec![origin];
    for direction in Direction::ALL {
        for distance in 1..=range {
            let pos = origin.offset(direction, distance);
            match terrain.get(pos) {
                None | Some(Tile::Wall) => break,
                Some(Tile::Block) => {
                    terrain.set(pos, Tile::Floor);
                    cells.push(pos);
                    break;
                }
                Some(Tile::Floor) => cells.push(pos),
            }
        }
    }
    cells
}

impl RoomInner {
    pub(crate) fn step(&mut self, now: Instant) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if self.closed {
            return outcome;
        }
        match self.state {
            MatchState::Waiting => {
                let count = self.players.len();
                let timer_done = self.waiting_since.is_some_and(|since| {
                    now.saturating_duration_since(since) >= self.config.waiting_duration
                });
                if count >= MIN_PLAYERS_TO_START
                    && (timer_done || count >= self.config.max_players)
                {
                    self.start_countdown(now, &mut outcome.outbox);
                }
            }
            MatchState::Countdown => {
                let done = self.countdown_since.is_some_and(|since| {
                    now.saturating_duration_since(since) >= self.config.countdown_duration
                });
                if done && self.advance(MatchState::Playing) {
                    outcome.outbox.push(
                        self.targets(Recipient::All),
                        self.envelope(ServerEvent::GameStarted {
                            state: MatchState::Playing,
                        }),
                    );
                }
            }
            MatchState::Playing => {
                self.resolve_bombs(now, &mut outcome.outbox);
                self.check_end(now, &mut outcome.outbox);
            }
            MatchState::Finished => {
                outcome.expired = self.finished_at.is_some_and(|at| {
                    now.saturating_duration_since(at) >= self.config.finished_grace
                });
            }
        }
        outcome
    }

    /// Resolves every bomb whose fuse has run out, lowest id first. Bombs
    /// are not set off by other blasts.
    fn resolve_bombs(&mut self, now: Instant, outbox: &mut Outbox) {
        let due: Vec<BombId> = self
            .bombs
            .values()
            .filter(|b| b.is_due(now))
            .map(|b| b.id)
            .collect();

        for bomb_id in due {
            let Some(bomb) = self.bombs.remove(&bomb_id) else {
                continue;
            };
            let flames = self
                .players
                .get(&bomb.owner)
                .map_or(0, |p| p.power_ups.flames);
            let range = self.config.base_blast_range.saturating_add(flames);
            let explosions = blast_set(&mut self.terrain, bomb.pos, range);

            for player in self.players.values_mut() {
                if player.is_alive() && explosions.contains(&player.pos) {
                    player.lives -= 1;
                    tracing::info!(room_id = %self.id, player_id = %player.id, lives = player.lives, %bomb_id, "player hit");
                }
            }
            tracing::debug!(room_id = %self.id, %bomb_id, cells = explosions.len(), "bomb exploded");

            outbox.push(
                self.targets(Recipient::All),
                self.envelope(ServerEvent::BombExploded {
                    bomb_id,
                    explosions,
                    map: self.terrain.snapshot(),
                    players: self.roster(),
                })
                .caused_by(bomb.owner),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_7x7() -> Terrain {
        Terrain::from_ascii(&[
            "#######", "#.....#", "#.....#", "#.....#", "#.....#", "#.....#", "#######",
        ])
        .unwrap()
    }

    #[test]
    fn test_blast_open_field_is_plus_shape() {
        let mut t = open_7x7();
        let cells = blast_set(&mut t, Position::new(3, 3), 2);
        assert_eq!(cells.len(), 1 + 4 * 2);
        assert_eq!(cells[0], Position::new(3, 3));
        for p in [(3, 1), (3, 2), (3, 4), (3, 5), (1, 3), (2, 3), (4, 3), (5, 3)] {
            assert!(cells.contains(&Position::new(p.0, p.1)), "missing {p:?}");
        }
    }

    #[test]
    fn test_blast_never_leaves_the_grid() {
        let mut t = Terrain::from_ascii(&["...", "...", "..."]).unwrap();
        let cells = blast_set(&mut t, Position::new(0, 0), 5);
        assert!(cells.iter().all(|p| t.in_bounds(*p)));
        assert_eq!(cells.len(), 5);
    }

    #[test]
    fn test_blast_range_zero_is_origin_only() {
        let mut t = open_7x7();
        assert_eq!(
            blast_set(&mut t, Position::new(3, 3), 0),
            vec![Position::new(3, 3)]
        );
    }

    #[test]
    fn test_block_destroyed_exactly_once() {
        let mut t = Terrain::from_ascii(&["#######", "#..+..#", "#######"]).unwrap();
        let first = blast_set(&mut t, Position::new(1, 1), 4);
        assert!(first.contains(&Position::new(3, 1)));
        assert!(!first.contains(&Position::new(4, 1)), "block stops the blast");
        assert_eq!(t.get(Position::new(3, 1)), Some(Tile::Floor));

        // The same cells again: now floor, so the blast runs on.
        let second = blast_set(&mut t, Position::new(1, 1), 4);
        assert!(second.contains(&Position::new(5, 1)));
    }
}
