//! Counting extended fingers from hand landmarks.
//!
//! The heuristic compares each finger tip against a lower joint of the same finger in image
//! space, so it assumes an upright hand facing the camera:
//!
//! - The thumb is extended if its tip lies to the left of the thumb MCP (smaller X). This does
//!   not account for handedness, so a right hand held palm-forward and a left hand held
//!   back-forward count the thumb, while the opposite poses don't.
//! - Every other finger is extended if its tip lies above its PIP joint (smaller Y, since Y points
//!   down).

use crate::landmark::Landmarks;

use super::landmark::{LandmarkIdx, NUM_LANDMARKS};

/// Tips of the four non-thumb fingers. Each is compared with the PIP joint two indices earlier.
const FINGER_TIPS: [LandmarkIdx; 4] = [
    LandmarkIdx::IndexFingerTip,
    LandmarkIdx::MiddleFingerTip,
    LandmarkIdx::RingFingerTip,
    LandmarkIdx::PinkyTip,
];

/// Counts the extended fingers of a single hand.
///
/// Returns 0 if `hand` doesn't contain a full set of hand landmarks.
pub fn count_extended(hand: &Landmarks) -> u32 {
    if hand.len() < NUM_LANDMARKS {
        return 0;
    }

    let pos = hand.positions();
    let x = |idx: LandmarkIdx| pos[idx as usize][0];
    let y = |idx: usize| pos[idx][1];

    let thumb = x(LandmarkIdx::ThumbTip) < x(LandmarkIdx::ThumbMcp);
    let fingers = FINGER_TIPS
        .iter()
        .filter(|&&tip| y(tip as usize) < y(tip as usize - 2))
        .count();

    u32::from(thumb) + fingers as u32
}

/// Counts the extended fingers of both hands.
///
/// Hands are counted independently and their counts added up. An absent hand contributes 0.
pub fn count_total(left: Option<&Landmarks>, right: Option<&Landmarks>) -> u32 {
    [left, right].into_iter().flatten().map(count_extended).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    use LandmarkIdx::*;

    /// A hand with all landmarks on a grid, every test failing.
    fn closed_hand() -> Landmarks {
        // Tips below their PIP joints, thumb tip right of the thumb MCP.
        Landmarks::from_positions((0..NUM_LANDMARKS).map(|i| [i as f32, i as f32, 0.0]))
    }

    fn set_xy(hand: &mut Landmarks, idx: LandmarkIdx, x: f32, y: f32) {
        hand.positions_mut()[idx as usize] = [x, y, 0.0];
    }

    fn open_hand() -> Landmarks {
        let mut hand = closed_hand();
        set_xy(&mut hand, ThumbTip, 0.0, 4.0);
        for tip in FINGER_TIPS {
            let pip = hand.positions()[tip as usize - 2];
            set_xy(&mut hand, tip, pip[0], pip[1] - 1.0);
        }
        hand
    }

    #[test]
    fn open_hand_counts_five() {
        assert_eq!(count_extended(&open_hand()), 5);
    }

    #[test]
    fn closed_hand_counts_zero() {
        assert_eq!(count_extended(&closed_hand()), 0);
    }

    #[test]
    fn only_thumb() {
        let mut hand = closed_hand();
        set_xy(&mut hand, ThumbTip, 1.0, 4.0);
        assert_eq!(count_extended(&hand), 1);
        assert_eq!(count_total(Some(&hand), None), 1);
    }

    #[test]
    fn pointing_index_finger() {
        let mut hand = closed_hand();
        set_xy(&mut hand, IndexFingerTip, 8.0, 5.0);
        assert_eq!(count_extended(&hand), 1);
    }

    #[test]
    fn tip_level_with_joint_is_not_extended() {
        let mut hand = closed_hand();
        set_xy(&mut hand, ThumbTip, 2.0, 4.0);
        set_xy(&mut hand, MiddleFingerTip, 12.0, 10.0);
        assert_eq!(count_extended(&hand), 0);
    }

    #[test]
    fn hands_add_up() {
        let open = open_hand();
        let closed = closed_hand();
        assert_eq!(count_total(Some(&open), Some(&open)), 10);
        assert_eq!(count_total(Some(&open), Some(&closed)), 5);
        assert_eq!(count_total(None, Some(&open)), 5);
        assert_eq!(count_total(Some(&open), None), 5);
        assert_eq!(count_total(None, None), 0);
    }

    #[test]
    fn incomplete_hand_counts_zero() {
        let mut partial = Landmarks::new(4);
        partial.positions_mut()[0] = [100.0, 0.0, 0.0];
        assert_eq!(count_extended(&partial), 0);
        assert_eq!(count_extended(&Landmarks::new(0)), 0);
    }
}
