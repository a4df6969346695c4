//! Hand landmark prediction.

use std::path::Path;

use anyhow::ensure;

use crate::iter::zip_exact;
use crate::landmark::{Confidence, Estimate, Landmarks, Network};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// Number of hand landmarks (see [`LandmarkIdx`]).
pub const NUM_LANDMARKS: usize = 21;

/// Landmark results estimated by [`HandNetwork`].
#[derive(Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    presence: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        LandmarkResult {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            presence: 0.0,
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
        self.presence
    }
}

/// Names for the hand landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Returns the pairs of hand landmark indices that form the hand skeleton.
pub fn connections() -> impl Iterator<Item = (usize, usize)> {
    CONNECTIVITY.iter().map(|&(a, b)| (a as usize, b as usize))
}

/// The hand landmark network, in either its "full" or "lite" variant.
///
/// The network expects an upright, roughly centered hand that fills most of its input.
pub struct HandNetwork {
    cnn: Cnn,
}

impl HandNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        // Outputs 2 and 3 hold the handedness and metric landmarks, which aren't used.
        let nn = NeuralNetwork::from_path(path)?
            .with_output_selection([0, 1])
            .load()?;
        let cnn = Cnn::new(nn, CnnInputShape::NCHW, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for HandNetwork {
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
    let presence_flag = &outputs[1];

    ensure!(
        screen_landmarks.shape() == [1, NUM_LANDMARKS * 3],
        "unexpected hand landmark shape {:?}",
        screen_landmarks.shape()
    );
    ensure!(
        presence_flag.shape() == [1, 1],
        "unexpected presence flag shape {:?}",
        presence_flag.shape()
    );

    estimate.presence = presence_flag.index(&[0, 0]).as_singular();
    for (xyz, out) in zip_exact(
        screen_landmarks.index(&[0]).as_slice().chunks_exact(3),
        estimate.landmarks.positions_mut(),
    ) {
        out.copy_from_slice(xyz);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::nn::tensor::Tensor;

    use super::*;

    #[test]
    fn extract_landmarks() {
        let outputs: Outputs = [
            Tensor::from_iter(&[1, 63], (0..63).map(|i| i as f32)),
            Tensor::from_iter(&[1, 1], [0.8]),
        ]
        .into_iter()
        .collect();

        let mut result = LandmarkResult::default();
        extract(&outputs, &mut result).unwrap();
        assert_eq!(result.confidence(), 0.8);

        let tip = result.landmarks().get(LandmarkIdx::ThumbTip as usize);
        assert_eq!(tip.position(), [12.0, 13.0, 14.0]);
    }

    #[test]
    fn skeleton() {
        assert_eq!(connections().count(), 21);
        assert!(connections().all(|(a, b)| a < NUM_LANDMARKS && b < NUM_LANDMARKS));
    }
}
