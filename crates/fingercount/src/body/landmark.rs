//! Body pose landmark prediction.

use std::path::Path;

use anyhow::ensure;

use crate::landmark::{Confidence, Estimate, Landmark, Landmarks, Network};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// Number of body pose landmarks (see [`LandmarkIdx`]).
pub const NUM_LANDMARKS: usize = 33;

/// The network additionally outputs 6 auxiliary landmarks used for RoI tracking.
const NUM_AUX_LANDMARKS: usize = 6;

/// Values per landmark: X, Y, Z, visibility, presence.
const VALUES_PER_LANDMARK: usize = 5;

#[derive(Clone)]
pub struct LandmarkResult {
    pose_presence: f32,
    landmarks: Landmarks,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        Self {
            pose_presence: 0.0,
            landmarks: Landmarks::new(NUM_LANDMARKS + NUM_AUX_LANDMARKS),
        }
    }
}

impl Estimate for LandmarkResult {
    #[inline]
    fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }
}

impl Confidence for LandmarkResult {
    #[inline]
    fn confidence(&self) -> f32 {
        self.pose_presence
    }
}

impl LandmarkResult {
    /// Returns the 33 body landmarks, without the auxiliary landmarks.
    pub fn pose_landmarks(&self) -> Landmarks {
        let mut pose = self.landmarks.clone();
        pose.truncate(NUM_LANDMARKS);
        pose
    }

    pub fn get(&self, i: LandmarkIdx) -> Landmark {
        self.landmarks.get(i as usize)
    }

    #[inline]
    pub fn presence(&self) -> f32 {
        self.pose_presence
    }
}

/// Names for the body pose landmarks.
///
/// "Left" and "right" refer to the person's own left and right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

/// Face landmarks of the pose (nose, eyes, ears and mouth).
pub const FACE_LANDMARKS: std::ops::RangeInclusive<usize> =
    LandmarkIdx::Nose as usize..=LandmarkIdx::MouthRight as usize;

const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Face:
        (Nose, LeftEyeInner),
        (LeftEyeInner, LeftEye),
        (LeftEye, LeftEyeOuter),
        (LeftEyeOuter, LeftEar),
        (Nose, RightEyeInner),
        (RightEyeInner, RightEye),
        (RightEye, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (MouthLeft, MouthRight),
        // Torso:
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        // Arms:
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (LeftPinky, LeftIndex),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (RightPinky, RightIndex),
        // Legs:
        (LeftHip, LeftKnee),
        (LeftKnee, LeftAnkle),
        (LeftAnkle, LeftHeel),
        (LeftHeel, LeftFootIndex),
        (LeftAnkle, LeftFootIndex),
        (RightHip, RightKnee),
        (RightKnee, RightAnkle),
        (RightAnkle, RightHeel),
        (RightHeel, RightFootIndex),
        (RightAnkle, RightFootIndex),
    ]
};

/// Returns the pairs of pose landmark indices that form the body skeleton.
pub fn connections() -> impl Iterator<Item = (usize, usize)> {
    CONNECTIVITY.iter().map(|&(a, b)| (a as usize, b as usize))
}

/// The pose landmark network, in either its "full" or "lite" variant.
///
/// The network runs on the whole camera frame.
pub struct PoseNetwork {
    cnn: Cnn,
}

impl PoseNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        // Only the screen landmarks and the pose flag are needed. Segmentation mask, heatmap and
        // world landmarks are not computed.
        let nn = NeuralNetwork::from_path(path)?
            .with_output_selection([0, 1])
            .load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for PoseNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
        extract(outputs, estimate)
    }
}

fn extract(outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
    ensure!(outputs.len() == 2, "expected 2 outputs, got {}", outputs.len());
    let screen_landmarks = &outputs[0];
    let pose_flag = &outputs[1];

    let num_values = (NUM_LANDMARKS + NUM_AUX_LANDMARKS) * VALUES_PER_LANDMARK;
    ensure!(
        screen_landmarks.shape() == [1, num_values],
        "unexpected pose landmark shape {:?}",
        screen_landmarks.shape()
    );
    ensure!(
        pose_flag.shape() == [1, 1],
        "unexpected pose flag shape {:?}",
        pose_flag.shape()
    );

    estimate.pose_presence = pose_flag.index(&[0, 0]).as_singular();

    let values = screen_landmarks.index(&[0]).as_slice();
    for (i, chunk) in values.chunks_exact(VALUES_PER_LANDMARK).enumerate() {
        let &[x, y, z, visibility, presence] = chunk else {
            unreachable!()
        };
        estimate.landmarks.set(
            i,
            Landmark::new([x, y, z])
                .with_visibility(sigmoid(visibility))
                .with_presence(sigmoid(presence)),
        );
    }

    Ok(())
}
