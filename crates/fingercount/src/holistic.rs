//! Whole-body landmark estimation: body pose, both hands and the face.
//!
//! The pose network runs on the whole frame. The regions of interest for the hand and face
//! networks are derived from the pose landmarks, so hands and face are only found when a person is
//! visible.

use crate::body::landmark::{
    LandmarkIdx as PoseIdx, PoseNetwork, FACE_LANDMARKS, NUM_LANDMARKS as NUM_POSE_LANDMARKS,
};
use crate::config::Settings;
use crate::face::landmark::FaceMeshNetwork;
use crate::hand::landmark::HandNetwork;
use crate::image::{Image, ImageView, Rect};
use crate::landmark::{Confidence, Estimate, Estimator, Landmarks};
use crate::timer::Timer;
use crate::{body, face, hand};

/// Landmark sets found in a single frame.
///
/// Every set is optional. All positions are normalized: X and Y are in range 0.0 to 1.0 relative
/// to the frame width and height.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolisticResult {
    /// The 33 body pose landmarks.
    pub pose: Option<Landmarks>,
    /// The 21 landmarks of the person's left hand.
    pub left_hand: Option<Landmarks>,
    /// The 21 landmarks of the person's right hand.
    pub right_hand: Option<Landmarks>,
    /// The 468 face mesh landmarks.
    pub face: Option<Landmarks>,
}

/// A detector that finds body, hand and face landmarks in a frame.
pub trait LandmarkProvider {
    /// Processes one frame.
    ///
    /// Failing to find any landmarks is not an error; the corresponding fields of the result are
    /// left empty.
    fn process(&mut self, frame: &Image) -> HolisticResult;

    /// Returns profiling timers of this provider, if it has any.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

/// Minimum network confidence for a landmark set to be reported.
const PRESENCE_THRESHOLD: f32 = 0.5;

/// Minimum visibility of the pose landmarks a region of interest is derived from.
const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Distance of the hand region's center from the wrist, relative to the wrist-knuckle distance.
const HAND_CENTER_OFFSET: f32 = 1.2;

/// Side length of the (square) hand region, relative to the wrist-knuckle distance.
const HAND_REGION_SCALE: f32 = 3.5;

/// Side length of the (square) face region, relative to the extent of the pose face landmarks.
const FACE_REGION_SCALE: f32 = 1.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Computes the region of interest for one hand from the pose landmarks.
///
/// `pose` must contain the body landmarks in pixel coordinates. Returns [`None`] if the wrist is
/// not visible enough.
pub fn hand_region(pose: &Landmarks, side: Side) -> Option<Rect> {
    let (wrist, index, pinky) = match side {
        Side::Left => (PoseIdx::LeftWrist, PoseIdx::LeftIndex, PoseIdx::LeftPinky),
        Side::Right => (PoseIdx::RightWrist, PoseIdx::RightIndex, PoseIdx::RightPinky),
    };
    let wrist = pose.get(wrist as usize);
    if wrist.visibility().unwrap_or(1.0) < VISIBILITY_THRESHOLD {
        return None;
    }

    let index = pose.get(index as usize);
    let pinky = pose.get(pinky as usize);
    let knuckles = [
        (index.x() + pinky.x()) * 0.5,
        (index.y() + pinky.y()) * 0.5,
    ];
    let dir = [knuckles[0] - wrist.x(), knuckles[1] - wrist.y()];
    let len = dir[0].hypot(dir[1]);
    if len <= f32::EPSILON {
        return None;
    }

    let side = len * HAND_REGION_SCALE;
    Some(Rect::from_center(
        wrist.x() + dir[0] * HAND_CENTER_OFFSET,
        wrist.y() + dir[1] * HAND_CENTER_OFFSET,
        side,
        side,
    ))
}

/// Computes the region of interest for the face from the pose landmarks.
///
/// `pose` must contain the body landmarks in pixel coordinates. Returns [`None`] if the nose is
/// not visible enough.
pub fn face_region(pose: &Landmarks) -> Option<Rect> {
    let nose = pose.get(PoseIdx::Nose as usize);
    if nose.visibility().unwrap_or(1.0) < VISIBILITY_THRESHOLD {
        return None;
    }

    let bounds = Rect::bounding(FACE_LANDMARKS.map(|i| {
        let lm = pose.get(i);
        [lm.x(), lm.y()]
    }))?;
    let side = bounds.width().max(bounds.height()) * FACE_REGION_SCALE;
    if side <= f32::EPSILON {
        return None;
    }
    let [cx, cy] = bounds.center();
    Some(Rect::from_center(cx, cy, side, side))
}

/// Landmark provider running the MediaPipe pose, hand and face mesh networks.
pub struct Holistic {
    pose: Estimator<body::landmark::LandmarkResult>,
    hand: Estimator<hand::landmark::LandmarkResult>,
    face: Estimator<face::landmark::LandmarkResult>,
    t_pose: Timer,
    t_hands: Timer,
    t_face: Timer,
}

impl Holistic {
    /// Loads the networks from the configured model directory.
    pub fn load(settings: &Settings) -> anyhow::Result<Self> {
        log::info!("loading networks from '{}'", settings.model_dir().display());
        Ok(Self {
            pose: Estimator::new(PoseNetwork::load(settings.pose_model())?),
            hand: Estimator::new(HandNetwork::load(settings.hand_model())?),
            face: Estimator::new(FaceMeshNetwork::load(settings.face_model())?),
            t_pose: Timer::new("pose"),
            t_hands: Timer::new("hands"),
            t_face: Timer::new("face"),
        })
    }
}

/// Runs `estimator` on `view` and returns the landmarks if the network is confident enough.
///
/// Errors are logged and treated like an absent object.
fn estimate_landmarks<E: Estimate + Confidence>(
    estimator: &mut Estimator<E>,
    view: &ImageView<'_>,
    what: &str,
) -> Option<Landmarks> {
    match estimator.estimate(view) {
        Ok(result) if result.confidence() >= PRESENCE_THRESHOLD => {
            Some(result.landmarks().clone())
        }
        Ok(result) => {
            log::trace!("{what} confidence {} below threshold", result.confidence());
            None
        }
        Err(e) => {
            log::error!("{what} landmark estimation failed: {e:#}");
            None
        }
    }
}

impl LandmarkProvider for Holistic {
    fn process(&mut self, frame: &Image) -> HolisticResult {
        let view = frame.view(frame.rect());
        let pose = {
            let _guard = self.t_pose.start();
            estimate_landmarks(&mut self.pose, &view, "pose")
        };
        let Some(mut pose) = pose else {
            return HolisticResult::default();
        };
        // The pose network also estimates a few auxiliary landmarks that aren't part of the body.
        pose.truncate(NUM_POSE_LANDMARKS);

        let (left_hand, right_hand) = {
            let _guard = self.t_hands.start();
            let mut hand_at = |side: Side| -> Option<Landmarks> {
                let roi = hand_region(&pose, side)?;
                estimate_landmarks(&mut self.hand, &view.view(roi), "hand")
            };
            (hand_at(Side::Left), hand_at(Side::Right))
        };
        let face = face_region(&pose).and_then(|roi| {
            let _guard = self.t_face.start();
            estimate_landmarks(&mut self.face, &view.view(roi), "face")
        });

        let res = frame.resolution();
        let normalized = |mut lms: Landmarks| {
            lms.normalize(res);
            lms
        };
        HolisticResult {
            pose: Some(normalized(pose)),
            left_hand: left_hand.map(normalized),
            right_hand: right_hand.map(normalized),
            face: face.map(normalized),
        }
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_pose, &self.t_hands, &self.t_face]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::body::landmark::NUM_LANDMARKS;
    use crate::landmark::Landmark;

    use super::*;

    fn pose_with(points: &[(PoseIdx, [f32; 2], f32)]) -> Landmarks {
        let mut pose = Landmarks::new(NUM_LANDMARKS);
        for i in 0..NUM_LANDMARKS {
            pose.set(i, Landmark::new([0.0; 3]).with_visibility(1.0));
        }
        for &(idx, [x, y], vis) in points {
            pose.set(idx as usize, Landmark::new([x, y, 0.0]).with_visibility(vis));
        }
        pose
    }

    #[test]
    fn hand_region_follows_forearm() {
        let pose = pose_with(&[
            (PoseIdx::LeftWrist, [100.0, 200.0], 0.9),
            (PoseIdx::LeftIndex, [90.0, 180.0], 0.9),
            (PoseIdx::LeftPinky, [110.0, 180.0], 0.9),
        ]);
        let roi = hand_region(&pose, Side::Left).unwrap();
        // Knuckles are 20px above the wrist, so the region is centered 24px above it.
        assert_relative_eq!(roi.center()[0], 100.0);
        assert_relative_eq!(roi.center()[1], 176.0);
        assert_relative_eq!(roi.width(), 70.0);
        assert_relative_eq!(roi.height(), 70.0);
    }

    #[test]
    fn hidden_wrist_has_no_hand_region() {
        let pose = pose_with(&[
            (PoseIdx::RightWrist, [100.0, 200.0], 0.2),
            (PoseIdx::RightIndex, [90.0, 180.0], 0.9),
            (PoseIdx::RightPinky, [110.0, 180.0], 0.9),
        ]);
        assert_eq!(hand_region(&pose, Side::Right), None);
    }

    #[test]
    fn degenerate_hand_has_no_region() {
        // All landmarks on top of each other.
        let pose = pose_with(&[]);
        assert_eq!(hand_region(&pose, Side::Left), None);
    }

    #[test]
    fn face_region_is_square() {
        let pose = pose_with(&[
            (PoseIdx::Nose, [50.0, 50.0], 1.0),
            (PoseIdx::LeftEar, [70.0, 45.0], 1.0),
            (PoseIdx::RightEar, [30.0, 45.0], 1.0),
            (PoseIdx::MouthLeft, [55.0, 60.0], 1.0),
            (PoseIdx::MouthRight, [45.0, 60.0], 1.0),
            (PoseIdx::LeftEyeInner, [52.0, 44.0], 1.0),
            (PoseIdx::LeftEye, [55.0, 44.0], 1.0),
            (PoseIdx::LeftEyeOuter, [58.0, 44.0], 1.0),
            (PoseIdx::RightEyeInner, [48.0, 44.0], 1.0),
            (PoseIdx::RightEye, [45.0, 44.0], 1.0),
            (PoseIdx::RightEyeOuter, [42.0, 44.0], 1.0),
        ]);
        let roi = face_region(&pose).unwrap();
        assert_relative_eq!(roi.width(), 40.0 * FACE_REGION_SCALE);
        assert_relative_eq!(roi.height(), roi.width());
        assert_relative_eq!(roi.center()[0], 50.0);
        assert_relative_eq!(roi.center()[1], 52.0);
    }

    #[test]
    fn hidden_nose_has_no_face_region() {
        let pose = pose_with(&[(PoseIdx::Nose, [50.0, 50.0], 0.1)]);
        assert_eq!(face_region(&pose), None);
    }
}
