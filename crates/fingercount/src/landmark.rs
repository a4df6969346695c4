//! Common code for visual landmark estimation.

use crate::image::{ImageView, Resolution};
use crate::nn::{Cnn, Outputs};

pub type Position = [f32; 3];

/// A list of landmarks, with optional per-landmark visibility and presence values.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
    visibility: Option<Box<[f32]>>,
    presence: Option<Box<[f32]>>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks will start with all coordinates at `0.0`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
            visibility: None,
            presence: None,
        }
    }

    /// Creates a landmark collection from a list of positions.
    pub fn from_positions<I: IntoIterator<Item = Position>>(positions: I) -> Self {
        Self {
            positions: positions.into_iter().collect(),
            visibility: None,
            presence: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        (0..self.positions.len()).map(|i| self.get(i))
    }

    /// Returns the landmark at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> Landmark {
        Landmark {
            pos: self.positions[index],
            visibility: self.visibility.as_ref().map(|vis| vis[index]),
            presence: self.presence.as_ref().map(|pres| pres[index]),
        }
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        let len = self.positions.len();
        self.positions[index] = landmark.pos;
        if let Some(vis) = landmark.visibility {
            self.visibility
                .get_or_insert_with(|| vec![0.0; len].into())[index] = vis;
        }
        if let Some(pres) = landmark.presence {
            self.presence
                .get_or_insert_with(|| vec![0.0; len].into())[index] = pres;
        }
    }

    /// Shortens the collection, keeping the first `len` landmarks.
    pub fn truncate(&mut self, len: usize) {
        fn trunc<T: Copy>(slice: &mut Box<[T]>, len: usize) {
            if len < slice.len() {
                *slice = slice[..len].into();
            }
        }

        trunc(&mut self.positions, len);
        if let Some(vis) = &mut self.visibility {
            trunc(vis, len);
        }
        if let Some(pres) = &mut self.presence {
            trunc(pres, len);
        }
    }

    #[inline]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }

    /// Converts pixel coordinates in an image of resolution `res` to normalized coordinates.
    ///
    /// X and Y are divided by the image width and height, respectively. Z uses the same scale as
    /// X, so that the landmarks keep their proportions in depth.
    pub fn normalize(&mut self, res: Resolution) {
        let (w, h) = (res.width() as f32, res.height() as f32);
        self.map_positions(|[x, y, z]| [x / w, y / h, z / w]);
    }
}

/// A landmark in 3D space.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
    presence: Option<f32>,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self {
            visibility: Some(visibility),
            ..self
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Likelihood of the landmark being visible (not occluded), if the network estimates it.
    #[inline]
    pub fn visibility(&self) -> Option<f32> {
        self.visibility
    }

    /// Likelihood of the landmark being inside the image, if the network estimates it.
    #[inline]
    pub fn presence(&self) -> Option<f32> {
        self.presence
    }
}

/// Trait for landmark estimation results returned by [`Estimator::estimate`].
pub trait Estimate: Send + 'static {
    fn landmarks(&self) -> &Landmarks;

    fn landmarks_mut(&mut self) -> &mut Landmarks;
}

/// Trait for network inference results that contain a confidence value.
pub trait Confidence {
    /// Confidence value indicating whether the object is in view.
    ///
    /// By convention, this is in range 0.0 to 1.0, with anything above 0.5 indicating that the
    /// object is probably visible.
    fn confidence(&self) -> f32;
}

/// Trait implemented by wrapper types around neural networks that estimate landmarks.
pub trait Network: Send + 'static {
    /// Type representing the predicted landmarks.
    type Output: Estimate;

    /// Returns the [`Cnn`] to use for landmark estimation.
    fn cnn(&self) -> &Cnn;

    /// Extracts the network outputs and writes them to `estimate`.
    ///
    /// The landmark positions are expected to be in the coordinate system of the network's input.
    /// Returns an error if the outputs don't have the expected shapes.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Neural-network based landmark estimator.
///
/// This estimator processes an input image and yields an [`Estimate`] of type `E`, containing the
/// derived [`Landmarks`] and other data (depending on the network).
pub struct Estimator<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
}

impl<E: Estimate + Default> Estimator<E> {
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
        }
    }
}

impl<E: Estimate> Estimator<E> {
    /// Returns the expected input resolution of the internal neural network.
    ///
    /// If an image is passed that has a different resolution, it will be sampled to match the input
    /// resolution. The [`Estimator`] will also automatically ensure that the aspect ratio matches
    /// by creating an oversized view of the input.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Performs landmark estimation on `image`, returning the [`Estimate`].
    ///
    /// If the aspect ratio of `image` does not match the aspect ratio of the network's input, an
    /// enlarged view of the right aspect ratio is created first. This may include more pixels of
    /// the underlying image, or pad it with black bars.
    ///
    /// The landmark positions of the returned estimate are in the pixel coordinates of the image
    /// that `image` is a view of.
    pub fn estimate(&mut self, image: &ImageView<'_>) -> anyhow::Result<&mut E> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();

        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("network input has zero height");
        };
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = cnn.estimate(&view)?;
        log::trace!("inference result: {:?}", outputs);

        self.network.extract(&outputs, &mut self.estimate)?;

        // Map landmark coordinates back into the input image.
        let scale = rect.width() / input_res.width() as f32;
        self.estimate.landmarks_mut().map_positions(|pos| {
            let [x, y, z] = pos.map(|t| t * scale);
            // Undo the offset of the (possibly oversized) view.
            [x + rect.x(), y + rect.y(), z]
        });

        Ok(&mut self.estimate)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn optional_scores() {
        let mut lms = Landmarks::new(2);
        assert_eq!(lms.get(0).visibility(), None);

        lms.set(1, Landmark::new([1.0, 2.0, 3.0]).with_visibility(0.9));
        assert_eq!(lms.get(1).visibility(), Some(0.9));
        assert_eq!(lms.get(1).presence(), None);
        // Once one landmark has a visibility value, all of them do.
        assert_eq!(lms.get(0).visibility(), Some(0.0));
        assert_eq!(lms.get(1).position(), [1.0, 2.0, 3.0]);

        lms.truncate(1);
        assert_eq!(lms.len(), 1);
        assert_eq!(lms.iter().count(), 1);
        lms.truncate(5);
        assert_eq!(lms.len(), 1);
    }

    #[test]
    fn normalize() {
        let mut lms = Landmarks::from_positions([[320.0, 120.0, 64.0], [0.0, 480.0, -64.0]]);
        lms.normalize(Resolution::new(640, 480));
        assert_relative_eq!(lms.positions()[0][0], 0.5);
        assert_relative_eq!(lms.positions()[0][1], 0.25);
        assert_relative_eq!(lms.positions()[0][2], 0.1);
        assert_relative_eq!(lms.positions()[1][1], 1.0);
        assert_relative_eq!(lms.positions()[1][2], -0.1);
    }
}
