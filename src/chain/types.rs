//! Chain types as returned by the Lotus JSON-RPC API.

use serde::Deserialize;
use thiserror::Error;

/// Epoch number of a tip-set.
pub type ChainEpoch = i64;

/// One block of a tip-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub cid: String,
    pub miner: String,
}

/// A tip-set: the set of blocks at one height.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "LotusTipSet")]
pub struct TipSet {
    pub height: ChainEpoch,
    pub blocks: Vec<BlockHeader>,
}

impl TipSet {
    pub fn new(height: ChainEpoch, blocks: Vec<BlockHeader>) -> Self {
        Self { height, blocks }
    }

    /// Block CIDs identifying this tip-set.
    pub fn key(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.cid.as_str()).collect()
    }
}

#[derive(Debug, Error)]
#[error("tip-set at height {height} has {cids} cids but {blocks} blocks")]
pub struct MalformedTipSet {
    height: ChainEpoch,
    cids: usize,
    blocks: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LotusTipSet {
    cids: Vec<LotusCid>,
    blocks: Vec<LotusBlock>,
    height: ChainEpoch,
}

#[derive(Deserialize)]
struct LotusCid {
    #[serde(rename = "/")]
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LotusBlock {
    miner: String,
}

impl TryFrom<LotusTipSet> for TipSet {
    type Error = MalformedTipSet;

    fn try_from(raw: LotusTipSet) -> Result<Self, Self::Error> {
        if raw.cids.len() != raw.blocks.len() {
            return Err(MalformedTipSet {
                height: raw.height,
                cids: raw.cids.len(),
                blocks: raw.blocks.len(),
            });
        }

        let blocks = raw
            .cids
            .into_iter()
            .zip(raw.blocks)
            .map(|(cid, block)| BlockHeader {
                cid: cid.value,
                miner: block.miner,
            })
            .collect();

        Ok(TipSet::new(raw.height, blocks))
    }
}
