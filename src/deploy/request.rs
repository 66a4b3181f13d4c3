use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::{JsonAbi, Param};
use alloy_primitives::{hex, Bytes};
use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Compiled contract as emitted by Hardhat (`bytecode: "0x.."`) or
/// Foundry (`bytecode: { object: "0x.." }`).
#[derive(Debug, Deserialize)]
struct ContractArtifact {
    abi: JsonAbi,
    bytecode: ArtifactBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(String),
    Object { object: String },
}

impl ArtifactBytecode {
    fn as_hex(&self) -> &str {
        match self {
            Self::Hex(hex) => hex,
            Self::Object { object } => object,
        }
    }
}

/// Everything needed to build a contract-creation transaction.
///
/// Validated for shape on construction and immutable afterwards.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    abi: JsonAbi,
    bytecode: Bytes,
    constructor_args: Vec<String>,
    gas_limit: u64,
}

impl DeploymentRequest {
    pub fn new(
        abi: JsonAbi,
        bytecode: Bytes,
        constructor_args: Vec<String>,
        gas_limit: u64,
    ) -> AppResult<Self> {
        if bytecode.is_empty() {
            return Err(AppError::abi("bytecode is empty"));
        }
        if gas_limit == 0 {
            return Err(AppError::abi("gas limit must be positive"));
        }

        let expected = abi.constructor.as_ref().map_or(0, |c| c.inputs.len());
        if expected != constructor_args.len() {
            return Err(AppError::abi(format!(
                "constructor takes {} argument(s), got {}",
                expected,
                constructor_args.len()
            )));
        }

        let request = Self {
            abi,
            bytecode,
            constructor_args,
            gas_limit,
        };
        // Surface type mismatches before anything is sent to the wallet.
        request.constructor_values()?;
        Ok(request)
    }

    /// Build a request from raw ABI JSON and hex bytecode.
    pub fn from_parts(
        abi_json: &str,
        bytecode_hex: &str,
        constructor_args: Vec<String>,
        gas_limit: u64,
    ) -> AppResult<Self> {
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| AppError::abi(format!("malformed ABI: {}", e)))?;
        Self::new(abi, decode_bytecode(bytecode_hex)?, constructor_args, gas_limit)
    }

    pub fn from_artifact_json(
        json: &str,
        constructor_args: Vec<String>,
        gas_limit: u64,
    ) -> AppResult<Self> {
        let artifact: ContractArtifact = serde_json::from_str(json)
            .map_err(|e| AppError::Artifact(format!("malformed artifact: {}", e)))?;
        let bytecode = decode_bytecode(artifact.bytecode.as_hex())?;
        Self::new(artifact.abi, bytecode, constructor_args, gas_limit)
    }

    pub fn from_artifact_file(
        path: impl AsRef<Path>,
        constructor_args: Vec<String>,
        gas_limit: u64,
    ) -> AppResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AppError::Artifact(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_artifact_json(&json, constructor_args, gas_limit)
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    pub fn constructor_args(&self) -> &[String] {
        &self.constructor_args
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Creation calldata: bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_data(&self) -> AppResult<Bytes> {
        let mut data = self.bytecode.to_vec();
        if let Some(constructor) = &self.abi.constructor {
            let values = self.constructor_values()?;
            let encoded = constructor
                .abi_encode_input(&values)
                .map_err(|e| AppError::abi(format!("cannot encode constructor arguments: {}", e)))?;
            data.extend_from_slice(&encoded);
        }
        Ok(data.into())
    }

    fn constructor_values(&self) -> AppResult<Vec<DynSolValue>> {
        let Some(constructor) = &self.abi.constructor else {
            return Ok(Vec::new());
        };
        constructor
            .inputs
            .iter()
            .zip(&self.constructor_args)
            .map(|(param, raw)| coerce_arg(param, raw))
            .collect()
    }
}

fn coerce_arg(param: &Param, raw: &str) -> AppResult<DynSolValue> {
    let ty = <Param as Specifier<DynSolType>>::resolve(param)
        .map_err(|e| AppError::abi(format!("unsupported parameter type {}: {}", param.ty, e)))?;
    ty.coerce_str(raw).map_err(|e| {
        AppError::abi(format!(
            "argument {:?} is not a valid {} for {}: {}",
            raw, param.ty, param.name, e
        ))
    })
}

fn decode_bytecode(text: &str) -> AppResult<Bytes> {
    hex::decode(text.trim())
        .map(Bytes::from)
        .map_err(|e| AppError::abi(format!("bytecode is not valid hex: {}", e)))
}
