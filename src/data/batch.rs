use burn::{data::dataloader::batcher::Batcher, prelude::*};

/// One text line as the external generator hands it over: a row-major
/// `steps x nb_features` feature matrix and the encoded transcription.
#[derive(Debug, Clone)]
pub struct LineItem {
    pub features: Vec<f32>,
    pub steps: usize,
    pub label: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct LineBatch<B: Backend> {
    /// `[batch, steps, features]`, zero-padded to the longest line.
    pub inputs: Tensor<B, 3>,
    /// Unpadded timestep count per line.
    pub input_lengths: Vec<usize>,
    /// Target class indices per line, kept host-side for the CTC loss.
    pub labels: Vec<Vec<u32>>,
}

#[derive(Clone, Debug)]
pub struct LineBatcher {
    nb_features: usize,
}

impl LineBatcher {
    pub fn new(nb_features: usize) -> Self {
        LineBatcher { nb_features }
    }
}

impl<B: Backend> Batcher<B, LineItem, LineBatch<B>> for LineBatcher {
    fn batch(&self, items: Vec<LineItem>, device: &B::Device) -> LineBatch<B> {
        let batch = items.len();
        let max_steps = items.iter().map(|item| item.steps).max().unwrap_or(1);

        let mut values = vec![0.0f32; batch * max_steps * self.nb_features];
        let mut input_lengths = Vec::with_capacity(batch);
        let mut labels = Vec::with_capacity(batch);

        for (i, item) in items.iter().enumerate() {
            let len = item.steps * self.nb_features;
            let offset = i * max_steps * self.nb_features;
            values[offset..offset + len].copy_from_slice(&item.features[..len]);

            input_lengths.push(item.steps);
            labels.push(item.label.clone());
        }

        let inputs = Tensor::from_data(
            TensorData::new(values, [batch, max_steps, self.nb_features])
                .convert::<B::FloatElem>(),
            device,
        );

        LineBatch {
            inputs,
            input_lengths,
            labels,
        }
    }
}
