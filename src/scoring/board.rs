//! Match state and the scoring rules applied to it

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::debounce::GestureDebouncer;
use super::{ServeSlot, Side, Team};

/// Display names for the four player positions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerNames {
    pub left_top: String,
    pub left_bottom: String,
    pub right_top: String,
    pub right_bottom: String,
}

impl PlayerNames {
    pub fn get(&self, slot: ServeSlot) -> &str {
        match slot {
            ServeSlot::LeftTop => &self.left_top,
            ServeSlot::LeftBottom => &self.left_bottom,
            ServeSlot::RightTop => &self.right_top,
            ServeSlot::RightBottom => &self.right_bottom,
        }
    }

    fn get_mut(&mut self, slot: ServeSlot) -> &mut String {
        match slot {
            ServeSlot::LeftTop => &mut self.left_top,
            ServeSlot::LeftBottom => &mut self.left_bottom,
            ServeSlot::RightTop => &mut self.right_top,
            ServeSlot::RightBottom => &mut self.right_bottom,
        }
    }

    /// Exchange the top and bottom players of one side
    pub fn swap_within(&mut self, side: Side) {
        match side {
            Side::Left => std::mem::swap(&mut self.left_top, &mut self.left_bottom),
            Side::Right => std::mem::swap(&mut self.right_top, &mut self.right_bottom),
        }
    }

    /// Move every player to the diagonally opposite slot
    pub fn swap_diagonal(&mut self) {
        std::mem::swap(&mut self.left_top, &mut self.right_bottom);
        std::mem::swap(&mut self.left_bottom, &mut self.right_top);
    }
}

/// Score state of one match (owned by its session task)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub left_score: u32,
    pub right_score: u32,
    /// Every point ever credited; corrections never lower it
    pub total_points: u32,
    /// false: left = red, right = blue
    pub is_swapped: bool,
    pub last_point_winner: Option<Side>,
    pub serve: Option<ServeSlot>,
    pub names: PlayerNames,
}

impl MatchState {
    /// Fresh game: 0-0, right top serving
    pub fn new() -> Self {
        Self {
            left_score: 0,
            right_score: 0,
            total_points: 0,
            is_swapped: false,
            last_point_winner: None,
            serve: Some(ServeSlot::RightTop),
            names: PlayerNames::default(),
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    fn score_mut(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::Left => &mut self.left_score,
            Side::Right => &mut self.right_score,
        }
    }

    /// Credit a point to `side` and run the serve and rotation rules
    pub fn increment_score(&mut self, side: Side) {
        *self.score_mut(side) += 1;
        self.total_points += 1;

        self.update_server_on_point(side);
        self.handle_first_point_swap(side);
        self.consecutive_rotate(side);
    }

    /// Correction only: serve and rotation state stay as they are
    pub fn decrement_score(&mut self, side: Side) {
        let score = self.score_mut(side);
        *score = score.saturating_sub(1);
    }

    /// The point winner serves next from the slot given by its score parity
    pub fn update_server_on_point(&mut self, side: Side) {
        let even = self.score(side) % 2 == 0;
        let slot = match (side, even) {
            (Side::Left, true) | (Side::Right, false) => ServeSlot::bottom(side),
            (Side::Left, false) | (Side::Right, true) => ServeSlot::top(side),
        };
        self.serve = Some(slot);
    }

    /// The game opens with right top serving; if the right side takes the
    /// opening point its players change places.
    fn handle_first_point_swap(&mut self, side: Side) {
        if self.total_points == 1 && side == Side::Right {
            self.names.swap_within(Side::Right);
        }
    }

    fn consecutive_rotate(&mut self, side: Side) {
        if self.last_point_winner == Some(side) {
            self.names.swap_within(side);
        }
        self.last_point_winner = Some(side);
    }

    /// Teams change ends: scores, players and serve move across
    fn swap_sides(&mut self) {
        self.is_swapped = !self.is_swapped;
        std::mem::swap(&mut self.left_score, &mut self.right_score);
        self.names.swap_diagonal();
        self.serve = self.serve.map(ServeSlot::diagonal);

        let serving_side = self.serve.map(ServeSlot::side).unwrap_or(Side::Right);
        self.update_server_on_point(serving_side);
    }

    pub fn rename(&mut self, slot: ServeSlot, name: String) {
        *self.names.get_mut(slot) = name;
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands accepted by the scoreboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreEvent {
    Increment { side: Side },
    Decrement { side: Side },
    /// Thumbs-up seen on a physical side at `at_ms`
    RecordGesture { side: Side, at_ms: u64 },
    ToggleSwap,
    RenameSlot { slot: ServeSlot, name: String },
}

/// What an applied event changed, for re-render decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Counter that received a point
    pub credited: Option<Side>,
    pub scores: bool,
    pub serve: bool,
    pub names: bool,
    pub swapped: bool,
}

impl StateDelta {
    fn between(before: &MatchState, after: &MatchState, credited: Option<Side>) -> Self {
        Self {
            credited,
            scores: before.left_score != after.left_score
                || before.right_score != after.right_score,
            serve: before.serve != after.serve,
            names: before.names != after.names,
            swapped: before.is_swapped != after.is_swapped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.credited.is_none() && !self.scores && !self.serve && !self.names && !self.swapped
    }

    /// Fold a later delta into this one; the latest credited counter wins
    pub fn merge(&mut self, later: StateDelta) {
        self.credited = later.credited.or(self.credited);
        self.scores |= later.scores;
        self.serve |= later.serve;
        self.names |= later.names;
        self.swapped |= later.swapped;
    }
}

/// Match state plus the gesture cooldown, mutated only through `apply`
#[derive(Debug, Clone)]
pub struct Scoreboard {
    state: MatchState,
    debouncer: GestureDebouncer,
}

impl Scoreboard {
    pub fn new(gesture_cooldown_ms: u64) -> Self {
        Self {
            state: MatchState::new(),
            debouncer: GestureDebouncer::new(gesture_cooldown_ms),
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Single entry point for every mutation
    pub fn apply(&mut self, event: ScoreEvent) -> StateDelta {
        let before = self.state.clone();

        let credited = match event {
            ScoreEvent::Increment { side } => {
                self.state.increment_score(side);
                Some(side)
            }
            ScoreEvent::Decrement { side } => {
                self.state.decrement_score(side);
                None
            }
            ScoreEvent::RecordGesture { side, at_ms } => self.record_gesture(side, at_ms),
            ScoreEvent::ToggleSwap => {
                self.toggle_swap();
                None
            }
            ScoreEvent::RenameSlot { slot, name } => {
                self.state.rename(slot, name);
                None
            }
        };

        let delta = StateDelta::between(&before, &self.state, credited);
        debug!(
            left = self.state.left_score,
            right = self.state.right_score,
            serve = ?self.state.serve,
            credited = ?delta.credited,
            "Scoreboard updated"
        );
        delta
    }

    /// Debounced gesture scoring. Returns the counter credited, if any.
    fn record_gesture(&mut self, side: Side, at_ms: u64) -> Option<Side> {
        if !self.debouncer.should_accept(side, at_ms) {
            return None;
        }

        let counter = Team::on_side(side, self.state.is_swapped).counter();
        self.state.increment_score(counter);
        Some(counter)
    }

    fn toggle_swap(&mut self) {
        self.state.swap_sides();
        self.debouncer.reset();
    }
}

impl Default for Scoreboard {
    fn default() -> Self {
        Self::new(super::debounce::GESTURE_COOLDOWN_MS)
    }
}

// ── Tests ──────────────────────────────────────────────────
