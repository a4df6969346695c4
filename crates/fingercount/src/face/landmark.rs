//! A wrapper around MediaPipe's [Face Mesh] landmark predictor network.
//!
//! [Face Mesh]: https://google.github.io/mediapipe/solutions/face_mesh.html

use std::path::Path;

use anyhow::ensure;
use itertools::Itertools;

use crate::iter::zip_exact;
use crate::landmark::{Confidence, Estimate, Landmarks, Network};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// Number of face mesh landmarks.
pub const NUM_LANDMARKS: usize = 468;

/// Landmarks on the outline of the face, in clockwise order starting at the top of the forehead.
const FACE_OVAL: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

/// Returns the pairs of face mesh landmark indices that form the outline of the face.
pub fn oval_connections() -> impl Iterator<Item = (usize, usize)> {
    FACE_OVAL.iter().copied().circular_tuple_windows()
}

/// Estimates facial landmarks using the MediaPipe Face Mesh network.
///
/// The input image must be a cropped image of a mostly upright face.
pub struct FaceMeshNetwork {
    cnn: Cnn,
}

impl FaceMeshNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(-1.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for FaceMeshNetwork {
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
    ensure!(
        outputs[0].shape() == [1, 1, 1, NUM_LANDMARKS * 3],
        "unexpected face mesh shape {:?}",
        outputs[0].shape()
    );
    ensure!(outputs[1].shape() == [1, 1, 1, 1]);

    estimate.face_flag = sigmoid(outputs[1].index(&[0, 0, 0, 0]).as_singular());
    for (xyz, out) in zip_exact(
        outputs[0].index(&[0, 0, 0]).as_slice().chunks_exact(3),
        estimate.landmarks.positions_mut(),
    ) {
        out.copy_from_slice(xyz);
    }

    Ok(())
}

/// Landmark results estimated by [`FaceMeshNetwork`].
#[derive(Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    face_flag: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        Self {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            face_flag: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Returns the confidence that the input image contains a proper face.
    ///
    /// The returned value is in range 0.0 to 1.0.
    #[inline]
    pub fn face_confidence(&self) -> f32 {
        self.face_flag
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
    fn confidence(&self) -> f32 {
        self.face_confidence()
    }
}

#[cfg(test)]
mod tests {
    use crate::nn::tensor::Tensor;

    use super::*;

    #[test]
    fn oval_is_closed() {
        let pairs = oval_connections().collect::<Vec<_>>();
        assert_eq!(pairs.len(), FACE_OVAL.len());
        assert_eq!(pairs[0], (10, 338));
        assert_eq!(pairs.last(), Some(&(109, 10)));
        assert!(pairs.iter().all(|&(a, b)| a < NUM_LANDMARKS && b < NUM_LANDMARKS));
    }

    #[test]
    fn extract_mesh() {
        let outputs: Outputs = [
            Tensor::from_iter(&[1, 1, 1, 1404], (0..1404).map(|i| i as f32)),
            Tensor::from_iter(&[1, 1, 1, 1], [0.0]),
        ]
        .into_iter()
        .collect();
        let mut result = LandmarkResult::default();
        extract(&outputs, &mut result).unwrap();
        assert_eq!(result.face_confidence(), 0.5);
        assert_eq!(result.landmarks().get(1).position(), [3.0, 4.0, 5.0]);
        assert_eq!(result.landmarks().get(467).position(), [1401.0, 1402.0, 1403.0]);
    }
}
