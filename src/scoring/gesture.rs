//! Hand pose classification and frame side resolution

use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use super::Side;

/// Number of landmarks produced per hand by the pose estimator
pub const LANDMARK_COUNT: usize = 21;

const WRIST: usize = 0;

/// (tip, base joint) landmark indices per finger: thumb, index, middle, ring, pinky
const THUMB: (usize, usize) = (4, 2);
const CURLED_FINGERS: [(usize, usize); 4] = [(8, 5), (12, 9), (16, 13), (20, 17)];

/// Normalized 2D keypoint (origin top-left, y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn to(self, other: Landmark) -> [f32; 2] {
        [other.x - self.x, other.y - self.y]
    }
}

/// Pure pose heuristics, no state
pub struct PoseClassifier;

impl PoseClassifier {
    /// Thumb pointing away from its base while the other four fingers curl in.
    /// Short or missing landmark sets never match.
    pub fn is_thumbs_up(landmarks: &[Landmark]) -> bool {
        if landmarks.len() < LANDMARK_COUNT {
            return false;
        }

        let thumb_up = finger_angle(landmarks, THUMB) > FRAC_PI_2;
        let others_curled = CURLED_FINGERS
            .iter()
            .all(|&finger| finger_angle(landmarks, finger) < FRAC_PI_2);

        thumb_up && others_curled
    }

    /// Court side a hand belongs to. The feed is shown mirrored, so the left
    /// half of the raw frame is the right side of the court.
    pub fn resolve_side(landmarks: &[Landmark], frame_width: f32) -> Side {
        let Some(wrist) = landmarks.get(WRIST) else {
            return Side::Left;
        };

        if wrist.x * frame_width < frame_width / 2.0 {
            Side::Right
        } else {
            Side::Left
        }
    }
}

/// Angle between wrist->tip and base->tip for one finger
fn finger_angle(landmarks: &[Landmark], (tip, base): (usize, usize)) -> f32 {
    let wrist = landmarks[WRIST];
    let tip = landmarks[tip];
    let base = landmarks[base];
    angle_between(wrist.to(tip), tip.to(base))
}

/// Unsigned angle in radians; 0 when either vector has no length
fn angle_between(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dot = a[0] * b[0] + a[1] * b[1];
    let length = (a[0] * a[0] + a[1] * a[1]).sqrt() * (b[0] * b[0] + b[1] * b[1]).sqrt();
    if length == 0.0 {
        return 0.0;
    }
    (dot / length).clamp(-1.0, 1.0).acos()
}

/// One frame worth of detected hands from the pose source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Width of the analyzed frame in pixels
    pub frame_width: f32,
    /// One landmark set per detected hand
    #[serde(default)]
    pub hands: Vec<Vec<Landmark>>,
}

impl PoseFrame {
    /// Sides showing a thumbs-up in this frame, one entry per matching hand
    pub fn detected_sides(&self) -> Vec<Side> {
        self.hands
            .iter()
            .filter(|hand| PoseClassifier::is_thumbs_up(hand))
            .map(|hand| PoseClassifier::resolve_side(hand, self.frame_width))
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn make_hand(wrist_x: f32) -> Vec<Landmark> {
    vec![Landmark::new(wrist_x, 0.8); LANDMARK_COUNT]
}

#[cfg(test)]
pub(crate) fn set_landmark(hand: &mut [Landmark], index: usize, x: f32, y: f32) {
    hand[index] = Landmark::new(x, y);
}

/// Thumb extended straight up, other fingers folded back toward the wrist
#[cfg(test)]
pub(crate) fn thumbs_up_hand(wrist_x: f32) -> Vec<Landmark> {
    let mut hand = make_hand(wrist_x);
    set_landmark(&mut hand, 2, wrist_x, 0.6);
    set_landmark(&mut hand, 4, wrist_x, 0.4);
    for (tip, base) in CURLED_FINGERS {
        set_landmark(&mut hand, base, wrist_x + 0.1, 0.6);
        set_landmark(&mut hand, tip, wrist_x + 0.1, 0.7);
    }
    hand
}

// ── Tests ──────────────────────────────────────────────────
