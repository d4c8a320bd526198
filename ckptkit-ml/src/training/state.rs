//! State capture for checkpointed components.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A component whose internal state can be exported to and restored from bytes.
///
/// The checkpoint manager never looks inside the bytes, so any model or
/// optimizer representation can be checkpointed by implementing this trait.
///
/// # Example
///
/// ```
/// use ckptkit_ml::Stateful;
///
/// struct Counter(u64);
///
/// impl Stateful for Counter {
///     fn export_state(&self) -> anyhow::Result<Vec<u8>> {
///         Ok(self.0.to_le_bytes().to_vec())
///     }
///
///     fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
///         let bytes: [u8; 8] = blob.try_into()?;
///         self.0 = u64::from_le_bytes(bytes);
///         Ok(())
///     }
/// }
/// ```
pub trait Stateful {
    /// Serialize the component's state.
    fn export_state(&self) -> anyhow::Result<Vec<u8>>;

    /// Replace the component's state with a previously exported blob.
    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()>;
}

impl Stateful for Vec<u8> {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.clear();
        self.extend_from_slice(blob);
        Ok(())
    }
}

/// Named flat `f32` tensors, e.g. `"encoder.0.weight" -> [..]`.
///
/// Exported as JSON, which keeps checkpoints of small models inspectable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: BTreeMap<String, Vec<f32>>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) -> Option<Vec<f32>> {
        self.params.insert(name.into(), values)
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.params.get(name).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<f32>> {
        self.params.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar values across all tensors.
    pub fn num_values(&self) -> usize {
        self.params.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl Stateful for ParameterSet {
    fn export_state(&self) -> anyhow::Result<Vec<u8>> {
        if let Some((name, _)) = self.iter().find(|(_, v)| v.iter().any(|x| !x.is_finite())) {
            anyhow::bail!("parameter '{name}' contains a non-finite value");
        }
        serde_json::to_vec(&self.params).context("encoding parameter set")
    }

    fn import_state(&mut self, blob: &[u8]) -> anyhow::Result<()> {
        self.params = serde_json::from_slice(blob).context("decoding parameter set")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert("dense.weight", vec![0.5, -1.25, 3.0]);
        params.insert("dense.bias", vec![0.1]);
        params
    }

    #[test]
    fn test_parameter_set_accessors() {
        let params = sample();
        assert_eq!(params.len(), 2);
        assert_eq!(params.num_values(), 4);
        assert_eq!(params.get("dense.bias"), Some(&[0.1f32][..]));
        assert!(params.get("missing").is_none());
        let names: Vec<_> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["dense.bias", "dense.weight"]);
    }

    #[test]
    fn test_parameter_set_state_transfer() {
        let params = sample();
        let blob = params.export_state().unwrap();

        let mut restored = ParameterSet::new();
        restored.insert("stale", vec![9.0]);
        restored.import_state(&blob).unwrap();

        assert_eq!(restored, params);
        assert!(restored.get("stale").is_none());
    }

    #[test]
    fn test_parameter_set_rejects_non_finite() {
        let mut params = sample();
        params.get_mut("dense.bias").unwrap()[0] = f32::NAN;
        let err = params.export_state().unwrap_err();
        assert!(err.to_string().contains("dense.bias"));
    }

    #[test]
    fn test_parameter_set_rejects_garbage() {
        let mut params = ParameterSet::new();
        assert!(params.import_state(b"\x00\x01").is_err());
    }

    #[test]
    fn test_raw_bytes_state() {
        let source = vec![1u8, 2, 3];
        let mut target = vec![9u8; 10];
        target.import_state(&source.export_state().unwrap()).unwrap();
        assert_eq!(target, source);
    }
}
