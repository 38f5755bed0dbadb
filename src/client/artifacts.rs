//! Compiled contract artifacts
//!
//! Foundry writes `out/<Name>.sol/<Name>.json` with the creation code under
//! `bytecode.object`. Hardhat writes `<Name>.json` with a plain `bytecode`
//! string. Both layouts are accepted.

use crate::codec;
use crate::error::{DappError, Result};
use alloy_primitives::Bytes;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Foundry { object: String },
    Hardhat(String),
}

#[derive(Deserialize)]
struct Artifact {
    bytecode: BytecodeField,
}

pub fn load_bytecode(path: &Path) -> Result<Bytes> {
    let text = fs::read_to_string(path)
        .map_err(|e| DappError::ArtifactError(format!("{}: {}", path.display(), e)))?;
    let artifact: Artifact = serde_json::from_str(&text)
        .map_err(|e| DappError::ArtifactError(format!("{}: {}", path.display(), e)))?;

    let hex = match artifact.bytecode {
        BytecodeField::Foundry { object } => object,
        BytecodeField::Hardhat(hex) => hex,
    };
    let code = codec::decode_hex(&hex)
        .map_err(|e| DappError::ArtifactError(format!("{}: {}", path.display(), e)))?;
    if code.is_empty() {
        return Err(DappError::ArtifactError(format!(
            "{} has no creation code (abstract contract or interface?)",
            path.display()
        )));
    }
    Ok(Bytes::from(code))
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, contract: &str) -> Option<PathBuf> {
        let foundry = self.dir.join(format!("{}.sol", contract)).join(format!("{}.json", contract));
        let hardhat = self.dir.join(format!("{}.json", contract));
        [foundry, hardhat].into_iter().find(|p| p.exists())
    }

    pub fn bytecode(&self, contract: &str) -> Result<Bytes> {
        let path = self.path_for(contract).ok_or_else(|| {
            DappError::ArtifactError(format!("no artifact for {} under {}", contract, self.dir.display()))
        })?;
        load_bytecode(&path)
    }
}
