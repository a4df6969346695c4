//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and executed on the CPU with [`tract_onnx`].

pub mod tensor;

use std::{
    fmt,
    ops::{Index, RangeInclusive},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use tensor::Tensor;
use tract_onnx::prelude::{
    tvec, Framework, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedModel, TypedOp,
};

use crate::image::{Color, ImageView, Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    shape: CnnInputShape,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn, shape)?;
        Ok(Self {
            nn,
            input_res,
            shape,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork, shape: CnnInputShape) -> anyhow::Result<Resolution> {
        let input = match nn.inputs() {
            [input] => input,
            inputs => bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                inputs.len(),
            ),
        };

        let (w, h) = match (shape, input.shape()) {
            (CnnInputShape::NCHW, &[1, 3, h, w]) => (w, h),
            (_, tensor_shape) => bail!(
                "invalid model input shape for {:?} CNN: {:?}",
                shape,
                tensor_shape,
            ),
        };

        Ok(Resolution::new(w.try_into()?, h.try_into()?))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on an input image, returning the estimated outputs.
    ///
    /// The image will be sampled to create the network's input tensor. If the image's aspect ratio
    /// does not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate(&self, image: &ImageView<'_>) -> anyhow::Result<Outputs> {
        let tensor = image_to_tensor(image, self.input_res, self.shape, &self.color_mapper);
        self.nn.estimate(&Inputs::from(tensor))
    }
}

fn image_to_tensor(
    view: &ImageView<'_>,
    res: Resolution,
    shape: CnnInputShape,
    color_mapper: &ColorMapper,
) -> Tensor {
    let (w, h) = (res.width() as usize, res.height() as usize);
    let sample = |x: usize, y: usize| {
        // Sample pixel centers so that a view of exactly the input size maps 1:1.
        let u = (x as f32 + 0.5) / w as f32;
        let v = (y as f32 + 0.5) / h as f32;
        color_mapper.map(view.sample(u, v))
    };

    match shape {
        CnnInputShape::NCHW => Tensor::from_shape_fn(&[1, 3, h, w], |index| {
            sample(index[3], index[2])[index[1]]
        }),
    }
}

/// Maps the sRGB colors of an input image to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// This operates on *non-linear* sRGB colors, but maps them linearly to the target range. The
    /// alpha channel is ignored.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
}

/// Neural network loader.
pub struct Loader {
    path: PathBuf,
    model_data: Vec<u8>,
    outputs: Option<Vec<usize>>,
}

impl Loader {
    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of network output indices. When called, the [`Outputs`] returned from
    /// [`NeuralNetwork::estimate`] will only contain the chosen output tensors, in the given order.
    pub fn with_output_selection<O>(mut self, outputs: O) -> Self
    where
        O: Into<Vec<usize>>,
    {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed or incomplete, if the network uses
    /// unimplemented operations, or if it has inputs or outputs with a symbolic shape.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)
            .and_then(|model| model.into_optimized())
            .with_context(|| format!("failed to load network '{}'", self.path.display()))?;

        let outputs = graph.output_outlets()?;
        let selected_outputs = match &self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs.get(i).copied().with_context(|| {
                        format!("network has no output #{i} ({} outputs)", outputs.len())
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let model = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

        let graph = model.model();
        let inputs = (0..graph.inputs.len())
            .map(|id| -> anyhow::Result<TensorInfo> {
                let node = graph.input_outlets()?[id].node;
                TensorInfo::new(&graph.node(node).name, &graph.input_fact(id)?.shape)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let outputs = (0..graph.outputs.len())
            .map(|id| -> anyhow::Result<TensorInfo> {
                let node = graph.output_outlets()?[id].node;
                TensorInfo::new(&graph.node(node).name, &graph.output_fact(id)?.shape)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        log::debug!(
            "loaded '{}': inputs {:?}, outputs {:?}",
            self.path.display(),
            inputs,
            outputs,
        );

        Ok(NeuralNetwork(Arc::new(NeuralNetworkImpl {
            plan: model,
            inputs,
            outputs,
        })))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    plan: Model,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl NeuralNetwork {
    /// Reads a pre-trained model from an ONNX file.
    ///
    /// The path must have a `.onnx` extension. The returned [`Loader`] can be used to configure
    /// the network before loading it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Loader> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read network '{}'", path.display()))?;
        Ok(Loader {
            path: path.to_path_buf(),
            model_data,
            outputs: None,
        })
    }

    /// Returns information about the network's inputs.
    ///
    /// To perform inference, a matching input tensor has to be provided for each input.
    pub fn inputs(&self) -> &[TensorInfo] {
        &self.0.inputs
    }

    /// Returns information about the (selected) network outputs.
    pub fn outputs(&self) -> &[TensorInfo] {
        &self.0.outputs
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> anyhow::Result<Outputs> {
        if inputs.len() != self.inputs().len() {
            bail!(
                "network takes {} inputs, but {} were provided",
                self.inputs().len(),
                inputs.len()
            );
        }

        let tract_inputs = inputs
            .inner
            .iter()
            .map(|t| -> anyhow::Result<TValue> { Ok(TValue::from_const(Arc::new(t.to_tract()?))) })
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self
            .0
            .plan
            .run(tract_inputs)?
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<TVec<_>>>()?;

        Ok(Outputs { inner: outputs })
    }
}

/// Name and shape of a neural network input or output.
#[derive(Clone)]
pub struct TensorInfo {
    name: String,
    shape: Vec<usize>,
}

impl TensorInfo {
    fn new(name: &str, shape: &tract_onnx::prelude::ShapeFact) -> anyhow::Result<Self> {
        let shape = shape
            .as_concrete()
            .with_context(|| format!("network tensor '{name}' has a symbolic shape"))?;
        Ok(Self {
            name: name.to_string(),
            shape: shape.to_vec(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl fmt::Debug for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.name, self.shape)
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's (selected) output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    /// Returns the number of input tensors stored in `self`.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<Tensor> for Inputs {
    fn from(t: Tensor) -> Self {
        Self { inner: tvec![t] }
    }
}

impl FromIterator<Tensor> for Inputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::image::{Image, Rect};

    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
        // Transparent padding outside of the frame maps to black.
        assert_eq!(mapper.map(Color::NULL), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn input_tensor_layout() {
        let mut image = Image::new(2, 2);
        image.set(1, 0, Color::RED);
        image.set(0, 1, Color::BLUE);
        let view = image.view(image.rect());
        let mapper = ColorMapper::linear(0.0..=1.0);
        let res = Resolution::new(2, 2);

        let nchw = image_to_tensor(&view, res, CnnInputShape::NCHW, &mapper);
        assert_eq!(nchw.shape(), &[1, 3, 2, 2]);
        // Red channel, first row.
        assert_eq!(nchw.index(&[0, 0, 0]).as_slice(), &[0.0, 1.0]);
        // Blue channel, second row.
        assert_eq!(nchw.index(&[0, 2, 1]).as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn input_tensor_pads_outside_of_frame() {
        let mut image = Image::new(2, 2);
        image.clear(Color::WHITE);
        // Twice as wide as the image, centered: the outer columns are outside of the frame.
        let view = image.view(Rect::from_top_left(-1.0, 0.0, 4.0, 2.0));
        let tensor = image_to_tensor(
            &view,
            Resolution::new(4, 1),
            CnnInputShape::NCHW,
            &ColorMapper::linear(0.0..=1.0),
        );
        assert_eq!(tensor.index(&[0, 1, 0]).as_slice(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_model_file() {
        let err = NeuralNetwork::from_path("/nonexistent/pose.onnx")
            .err()
            .expect("loading a missing file should fail");
        assert!(err.to_string().contains("/nonexistent/pose.onnx"), "{err}");

        assert!(NeuralNetwork::from_path("model.tflite").is_err());
    }
}
