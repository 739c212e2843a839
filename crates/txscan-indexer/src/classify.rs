//! Method classification for transaction calldata.
//!
//! The cascade is explicit and ordered:
//! 1. full ABI decode against the configured function table → `Decoded`
//! 2. 4-byte selector heuristic table → `KnownSelector`
//! 3. input present but unrecognized → `UnknownSelector`
//! 4. no input → `NoInput` (a plain value transfer)
//!
//! Classification never fails a run; every transaction gets a best-effort
//! `method` label.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::JsonAbi;

use txscan_core::error::IndexError;
use txscan_core::types::CallClassification;

/// Well-known selectors seen on monitored contracts. Used when the ABI
/// table has no match (or no ABI was configured).
fn default_selector_table() -> HashMap<[u8; 4], String> {
    let entries: &[(&str, &str)] = &[
        ("a9059cbb", "transfer"),
        ("23b872dd", "transferFrom"),
        ("095ea7b3", "approve"),
        ("a22cb465", "setApprovalForAll"),
        ("42842e0e", "safeTransferFrom"),
        ("40c10f19", "mint"),
        ("a0712d68", "mint"),
        ("1249c58b", "mint"),
        ("d0e30db0", "deposit"),
        ("2e1a7d4d", "withdraw"),
        ("3659cfe6", "upgradeTo"),
        ("4f1ef286", "upgradeToAndCall"),
    ];
    entries
        .iter()
        .map(|(sel, name)| {
            let mut bytes = [0u8; 4];
            hex::decode_to_slice(sel, &mut bytes).expect("static selector");
            (bytes, name.to_string())
        })
        .collect()
}

/// Classifies calldata into a method label.
pub struct MethodClassifier {
    abi: Option<JsonAbi>,
    selectors: HashMap<[u8; 4], String>,
}

impl MethodClassifier {
    /// Heuristic-table-only classifier (no ABI configured).
    pub fn new() -> Self {
        Self {
            abi: None,
            selectors: default_selector_table(),
        }
    }

    /// Classifier with a full ABI function table (standard Ethereum ABI
    /// JSON). Invalid ABI JSON is a configuration error.
    pub fn from_abi_json(abi_json: &str) -> Result<Self, IndexError> {
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| IndexError::Config(format!("invalid ABI JSON: {e}")))?;
        Ok(Self {
            abi: Some(abi),
            selectors: default_selector_table(),
        })
    }

    /// Classify raw calldata. Never errors.
    pub fn classify(&self, input: &[u8]) -> CallClassification {
        if input.is_empty() {
            return CallClassification::NoInput;
        }
        if input.len() < 4 {
            // Shorter than a selector: treat as opaque contract input.
            return CallClassification::UnknownSelector([0; 4]);
        }
        let selector: [u8; 4] = input[..4].try_into().expect("length checked");

        if let Some(name) = self.try_abi_decode(selector, &input[4..]) {
            return CallClassification::Decoded(name);
        }
        if let Some(name) = self.selectors.get(&selector) {
            return CallClassification::KnownSelector(name.clone());
        }
        CallClassification::UnknownSelector(selector)
    }

    /// Attempt a full decode of the calldata tail against the ABI function
    /// matching `selector`. Any failure falls through to the next stage.
    fn try_abi_decode(&self, selector: [u8; 4], tail: &[u8]) -> Option<String> {
        let abi = self.abi.as_ref()?;
        let func = abi.functions().find(|f| f.selector() == selector)?;

        let types: Vec<DynSolType> = func
            .inputs
            .iter()
            .map(|p| p.resolve())
            .collect::<Result<_, _>>()
            .ok()?;

        if types.is_empty() {
            return tail.is_empty().then(|| func.name.clone());
        }
        let tuple = DynSolType::Tuple(types);
        tuple.abi_decode(tail).ok().map(|_| func.name.clone())
    }
}

impl Default for MethodClassifier {
    fn default() -> Self {
        Self::new()
    }
}
