use std::sync::Mutex;

use ndarray::Array4;
use tch::{CModule, Device, Kind, Tensor};

use super::{ImageClassifier, InferenceError, ModelLoadError};
use crate::config::ImageModelConfig;

/// TorchScript image classifier.
///
/// `CModule` is not `Sync`, so calls are serialized through a mutex.
pub struct TorchImageClassifier {
    module: Mutex<CModule>,
    device: Device,
    channels_first: bool,
    apply_softmax: bool,
}

impl TorchImageClassifier {
    pub fn load(config: &ImageModelConfig) -> Result<Self, ModelLoadError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(&config.path, device)?;
        log::info!("TorchScript module placed on {:?}", device);
        Ok(Self {
            module: Mutex::new(module),
            device,
            channels_first: config.channels_first,
            apply_softmax: config.apply_softmax,
        })
    }
}

impl ImageClassifier for TorchImageClassifier {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let (n, h, w, c) = batch.dim();
        let data = batch.as_slice().ok_or(InferenceError::NonContiguous)?;

        let mut input = Tensor::from_slice(data)
            .view([n as i64, h as i64, w as i64, c as i64])
            .to_device(self.device);
        if self.channels_first {
            input = input.permute([0, 3, 1, 2]).contiguous();
        }

        let output = {
            let module = self
                .module
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            module
                .forward_ts(&[input])
                .map_err(|e| InferenceError::Model(e.to_string()))?
        };

        let output = if self.apply_softmax {
            output.softmax(-1, Kind::Float)
        } else {
            output
        };
        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);
        Ok(output_vec)
    }
}
