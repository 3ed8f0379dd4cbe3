use crate::{
    data::DataSource,
    model::{
        ctc::{beam_search_decode, greedy_decode},
        network::HtrNetwork,
    },
};
use burn::prelude::*;
use color_eyre::Result;

/// Transcribe a batch of line images, `[batch, steps, features]`, using the
/// network's decoder settings.
pub fn recognize<B: Backend>(
    network: &HtrNetwork<B>,
    source: &DataSource,
    inputs: Tensor<B, 3>,
) -> Result<Vec<String>> {
    let probs = network.model.forward_probs(inputs);
    let blank = network.model.num_classes() - 1;

    let decoded = if network.decoder.greedy {
        greedy_decode(probs, blank)?
    } else {
        beam_search_decode(
            probs,
            blank,
            network.decoder.beam_width,
            network.decoder.top_paths,
        )?
        .into_iter()
        .map(|mut paths| if paths.is_empty() { Vec::new() } else { paths.remove(0) })
        .collect()
    };

    Ok(decoded
        .iter()
        .map(|classes| source.decode_text(classes))
        .collect())
}
