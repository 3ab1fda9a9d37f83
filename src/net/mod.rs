//! The neural network behind the search: session loading, input encoding, the policy-move
//! codec and the batching evaluator.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::path::Path;
use log::{debug, info};
use ndarray::Array4;
use ort::ep::CUDA;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use thiserror::Error;

pub mod policy;
pub mod encode;
pub mod evaluator;

use self::evaluator::Evaluation;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// An error raised while loading or running the network
#[derive(Debug, Clone, Error)]
pub enum NetError {
    /// The model could not be loaded or has no usable layout. Fatal at engine construction.
    #[error("failed to load network: {0}")]
    Load(String),

    /// The model is missing a required output head.
    #[error("network exposes no usable {0} output")]
    MissingOutput(&'static str),

    /// Inference failed at runtime. The evaluator is unusable afterwards and every pending
    /// request observes this error.
    #[error("network execution failed: {0}")]
    Execution(String),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// An ONNX network with a policy head and a value and/or win-draw-loss head.
///
/// The engine does not care about the architecture of the model, only about its interface: an
/// input of `[batch, planes, 8, 8]` floats with 112 or 119 planes, and outputs which are
/// identified by their per-position element counts. An output of 1,858 elements is the policy
/// head, one of 3 elements the win-draw-loss head, and one of a single element the scalar
/// value head. At least one of the two value forms must be present.
pub struct Network {
    session: Session,
    planes: usize,
    policy_output: usize,
    wdl_output: Option<usize>,
    value_output: Option<usize>,
}

impl Network {
    /// Loads a network from an ONNX file and discovers its layout with a warm-up batch.
    pub fn load(path: &Path, use_gpu: bool) -> Result<Network, NetError> {
        let mut builder = Session::builder()
            .map_err(|err| NetError::Load(err.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|err| NetError::Load(err.to_string()))?
            .with_intra_threads(1)
            .map_err(|err| NetError::Load(err.to_string()))?;
        if use_gpu {
            builder = builder
                .with_execution_providers([CUDA::default().build()])
                .map_err(|err| NetError::Load(err.to_string()))?;
        }
        let mut session = builder
            .commit_from_file(path)
            .map_err(|err| NetError::Load(err.to_string()))?;

        for planes in [encode::PLANES_LEGACY, encode::PLANES_EXTENDED] {
            match Self::discover(&mut session, planes) {
                Ok((policy_output, wdl_output, value_output)) => {
                    info!(
                        "loaded network {}: {} input planes, policy output #{}, \
                         wdl {:?}, value {:?}",
                        path.display(), planes, policy_output, wdl_output, value_output);
                    return Ok(Network { session, planes, policy_output, wdl_output,
                                        value_output });
                }
                Err(err) => debug!("rejected {} input planes: {}", planes, err),
            }
        }

        Err(NetError::Load(format!("{}: no supported input layout", path.display())))
    }

    // Tries a warm-up batch with the given plane count and classifies the outputs by their
    // element counts.
    fn discover(session: &mut Session, planes: usize)
    -> Result<(usize, Option<usize>, Option<usize>), NetError> {
        let outputs = Self::run_raw(session, 1, planes, vec![0f32; planes * 64])?;

        let mut policy = None;
        let mut wdl = None;
        let mut value = None;
        for (i, output) in outputs.iter().enumerate() {
            match output.len() {
                policy::POLICY_SIZE => policy = Some(i),
                3 => wdl = Some(i),
                1 => value = Some(i),
                _ => { }
            }
        }

        let policy = policy.ok_or(NetError::MissingOutput("policy"))?;
        if wdl.is_none() && value.is_none() {
            return Err(NetError::MissingOutput("value"));
        }
        Ok((policy, wdl, value))
    }

    // Runs one batch and extracts every output as a flat float vector.
    fn run_raw(session: &mut Session, batch: usize, planes: usize, data: Vec<f32>)
    -> Result<Vec<Vec<f32>>, NetError> {
        let count = session.outputs().len();
        let array = Array4::from_shape_vec((batch, planes, 8, 8), data)
            .map_err(|err| NetError::Execution(err.to_string()))?;
        let input = Tensor::from_array(array)
            .map_err(|err| NetError::Execution(err.to_string()))?;

        let outputs = session.run(ort::inputs![input])
            .map_err(|err| NetError::Execution(err.to_string()))?;

        let mut extracted = Vec::with_capacity(count);
        for i in 0..count {
            let (_, data) = outputs[i].try_extract_tensor::<f32>()
                .map_err(|err| NetError::Execution(err.to_string()))?;
            extracted.push(data.to_vec());
        }
        Ok(extracted)
    }

    /// Returns the number of input planes the network expects.
    pub fn planes(&self) -> usize {
        self.planes
    }

    /// Evaluates a batch of encoded positions.
    ///
    /// `data` holds `batch` consecutive position encodings as produced by
    /// [`encode::encode`]. For each position the policy logits are softmax-normalized and the
    /// value is derived as `P(win) - P(loss)` from the win-draw-loss head when present, or
    /// `tanh` of the scalar head otherwise.
    pub fn run(&mut self, batch: usize, data: Vec<f32>) -> Result<Vec<Evaluation>, NetError> {
        let planes = self.planes;
        let outputs = Self::run_raw(&mut self.session, batch, planes, data)?;

        let policy_data = &outputs[self.policy_output];
        if policy_data.len() != batch * policy::POLICY_SIZE {
            return Err(NetError::Execution(format!(
                "policy output has {} elements for a batch of {}", policy_data.len(), batch)));
        }

        let mut evaluations = Vec::with_capacity(batch);
        for b in 0..batch {
            let logits = &policy_data[b * policy::POLICY_SIZE..(b + 1) * policy::POLICY_SIZE];
            let policy = softmax(logits);

            let value = if let Some(wdl) = self.wdl_output {
                let wdl = &outputs[wdl][b * 3..(b + 1) * 3];
                wdl[0] - wdl[2]
            } else if let Some(value) = self.value_output {
                outputs[value][b].tanh()
            } else {
                unreachable!("layout discovery guarantees a value output");
            };

            evaluations.push(Evaluation { value, policy });
        }
        Ok(evaluations)
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("planes", &self.planes)
            .field("policy_output", &self.policy_output)
            .field("wdl_output", &self.wdl_output)
            .field("value_output", &self.value_output)
            .finish()
    }
}

/// Numerically-stable softmax
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}
