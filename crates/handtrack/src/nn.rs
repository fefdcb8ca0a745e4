//! Neural network inference via `tract`.

use std::{path::Path, sync::Arc};

use image::RgbaImage;
use tract_onnx::prelude::{
    tract_ndarray::Array4, tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec,
    Tensor, TypedFact, TypedOp,
};

use crate::{rect::RotatedRect, resolution::Resolution};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, optimized neural network.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", path.display()))?;
        Self::from_onnx(&model_data)
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed or uses unimplemented operations.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?;
        let model = SimplePlan::new(graph)?;
        Ok(Self(Arc::new(model)))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the tensor shape of input `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        match fact.shape.as_concrete() {
            Some(shape) => Ok(shape.to_vec()),
            None => anyhow::bail!("network input {index} has a symbolic shape"),
        }
    }

    /// Runs the network on a single input tensor.
    #[doc(alias = "infer")]
    pub fn estimate(&self, input: Tensor) -> anyhow::Result<Outputs> {
        let outputs = self.0.run(tvec![TValue::from_const(Arc::new(input))])?;
        Ok(Outputs { inner: outputs })
    }
}

/// Samples the `region` of `image` into an NCHW tensor of size `input`, with RGB values mapped
/// to range 0.0 to 1.0.
///
/// The region may be rotated and may extend past the image. Pixels outside of the image are
/// black.
pub fn image_to_tensor(image: &RgbaImage, region: &RotatedRect, input: Resolution) -> Tensor {
    let (w, h) = (input.width() as usize, input.height() as usize);
    let step_x = region.rect().width() / w as f32;
    let step_y = region.rect().height() / h as f32;
    let array = Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        let (px, py) =
            region.transform_out(((x as f32 + 0.5) * step_x, (y as f32 + 0.5) * step_y));
        let (px, py) = (px.floor(), py.floor());
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            return 0.0;
        }
        f32::from(image.get_pixel(px as u32, py as u32)[c]) / 255.0
    });
    array.into()
}

/// The output tensors of an inference pass, in network output order.
pub struct Outputs {
    inner: TVec<TValue>,
}

impl Outputs {
    /// Returns the data of output `index` as a flat `f32` slice, checking its element count.
    pub fn f32_slice(&self, index: usize, expected_len: usize) -> anyhow::Result<&[f32]> {
        let Some(tensor) = self.inner.get(index) else {
            anyhow::bail!("network has no output {index}");
        };
        let data = tensor.as_slice::<f32>()?;
        if data.len() != expected_len {
            anyhow::bail!(
                "network output {index} has shape {:?}, expected {expected_len} elements",
                tensor.shape()
            );
        }
        Ok(data)
    }
}
