use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use hf_hub::api::sync::Api;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Anything that turns a pair of padded `(1, 3, H, W)` frames into a `(1, 2, H, W)` flow.
pub trait FlowEstimator {
    fn estimate(&mut self, image1: &Tensor, image2: &Tensor) -> Result<Tensor>;
}

#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub iters: u32,
    pub mixed_precision: bool,
}

/// Uses `model` as-is when it exists on disk, otherwise fetches it from `repo`.
pub fn resolve_checkpoint(model: &str, repo: Option<&str>) -> Result<PathBuf> {
    let local = Path::new(model);
    if local.exists() {
        return Ok(local.to_path_buf());
    }
    let Some(repo) = repo else {
        bail!("checkpoint {model} not found and no model repo configured");
    };
    info!(repo, file = model, "downloading checkpoint");
    Api::new()
        .and_then(|api| api.model(repo.to_string()).get(model))
        .with_context(|| format!("failed to download {model} from {repo}"))
}

/// A RAFT network exported to ONNX, evaluated with candle.
pub struct OnnxRaft {
    model: onnx::ModelProto,
    image_inputs: [String; 2],
    input_dtype: DType,
    iters_input: Option<String>,
    flow_output: String,
    options: ModelOptions,
}

fn tensor_type(info: &onnx::ValueInfoProto) -> Option<&onnx::type_proto::Tensor> {
    match info.r#type.as_ref()?.value.as_ref()? {
        onnx::type_proto::Value::TensorType(t) => Some(t),
        _ => None,
    }
}

/// Declared element type of an image input; undeclared inputs are taken as f32.
fn image_dtype(info: &onnx::ValueInfoProto) -> Result<DType> {
    let Some(elem) = tensor_type(info).map(|t| t.elem_type) else {
        return Ok(DType::F32);
    };
    match onnx::tensor_proto::DataType::try_from(elem) {
        Ok(onnx::tensor_proto::DataType::Undefined | onnx::tensor_proto::DataType::Float) => {
            Ok(DType::F32)
        }
        Ok(onnx::tensor_proto::DataType::Float16) => Ok(DType::F16),
        _ => bail!("unsupported element type {elem} for image input {}", info.name),
    }
}

fn is_scalar_i64(info: &onnx::ValueInfoProto) -> bool {
    tensor_type(info)
        .map(|t| {
            t.elem_type == onnx::tensor_proto::DataType::Int64 as i32
                && t.shape.as_ref().map(|s| s.dim.is_empty()).unwrap_or(false)
        })
        .unwrap_or(false)
}

impl OnnxRaft {
    pub fn load(path: &Path, options: ModelOptions) -> Result<Self> {
        let model = read_file(path)
            .with_context(|| format!("failed to load model {}", path.display()))?;
        Self::from_model(model, options)
    }

    pub fn from_model(model: onnx::ModelProto, options: ModelOptions) -> Result<Self> {
        let graph = model.graph.as_ref().context("model graph missing")?;

        let initializers: HashSet<&str> =
            graph.initializer.iter().map(|t| t.name.as_str()).collect();
        let inputs: Vec<&onnx::ValueInfoProto> = graph
            .input
            .iter()
            .filter(|i| !initializers.contains(i.name.as_str()))
            .collect();
        let [image1, image2, rest @ ..] = inputs.as_slice() else {
            bail!("model must take two image inputs, found {}", inputs.len());
        };

        let input_dtype = image_dtype(image1)?;
        if image_dtype(image2)? != input_dtype {
            bail!("image inputs {} and {} disagree on element type", image1.name, image2.name);
        }
        if options.mixed_precision && input_dtype != DType::F16 {
            bail!("mixed precision requested but the graph takes {input_dtype:?} images");
        }

        let iters_input = match rest {
            [] => None,
            [iters] if is_scalar_i64(iters) => Some(iters.name.clone()),
            [other, ..] => bail!("unsupported extra model input {}", other.name),
        };

        let flow_output = graph
            .output
            .iter()
            .find(|o| o.name == "flow_up")
            .or_else(|| graph.output.last())
            .map(|o| o.name.clone())
            .context("model has no outputs")?;
        debug!(
            image1 = %image1.name,
            image2 = %image2.name,
            dtype = ?input_dtype,
            iters = ?iters_input,
            output = %flow_output,
            "model bindings resolved"
        );

        let image_inputs = [image1.name.clone(), image2.name.clone()];
        Ok(Self {
            image_inputs,
            input_dtype,
            iters_input,
            flow_output,
            options,
            model,
        })
    }
}

impl FlowEstimator for OnnxRaft {
    fn estimate(&mut self, image1: &Tensor, image2: &Tensor) -> Result<Tensor> {
        let mut inputs = HashMap::new();
        inputs.insert(self.image_inputs[0].clone(), image1.to_dtype(self.input_dtype)?);
        inputs.insert(self.image_inputs[1].clone(), image2.to_dtype(self.input_dtype)?);
        if let Some(name) = &self.iters_input {
            inputs.insert(
                name.clone(),
                Tensor::new(self.options.iters as i64, image1.device())?,
            );
        }
        let mut outputs = simple_eval(&self.model, inputs).context("failed to run model")?;
        let flow = outputs
            .remove(&self.flow_output)
            .context("model output missing")?
            .to_dtype(DType::F32)?;
        check_flow_shape(&flow, image1)?;
        Ok(flow)
    }
}

fn check_flow_shape(flow: &Tensor, image: &Tensor) -> Result<()> {
    let (_, _, h, w) = image.dims4()?;
    match flow.dims() {
        [1, 2, fh, fw] if *fh == h && *fw == w => Ok(()),
        dims => bail!("unexpected flow shape {dims:?} for {h}x{w} input"),
    }
}

pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    let device = Device::cuda_if_available(0)?;
    debug!(cuda = device.is_cuda(), "device selected");
    Ok(device)
}
