use std::collections::BTreeMap;

use electrum_core::{RpcError, ValidationError, NO_PARAMS};

use crate::types::{BlockHeader, BlockHeaders};
use crate::Client;

/// Reject a checkpoint that does not lie strictly above `highest`.
///
/// For a ranged request `highest` is `start + count`, so a checkpoint equal
/// to that bound is refused as well.
pub fn check_checkpoint(highest: u32, checkpoint: u32) -> Result<(), ValidationError> {
    if checkpoint <= highest {
        return Err(ValidationError::CheckpointHeight {
            highest,
            checkpoint,
        });
    }
    Ok(())
}

impl Client {
    /// Fee rate in coin units per kilobyte for confirmation within `target`
    /// blocks. The server answers -1 when it has no estimate.
    pub async fn estimate_fee(&self, target: u32) -> Result<f64, RpcError> {
        self.session
            .request("blockchain.estimatefee", [target])
            .await
    }

    /// Minimum fee rate the server relays, in coin units per kilobyte.
    pub async fn relay_fee(&self) -> Result<f64, RpcError> {
        self.session
            .request("blockchain.relayfee", NO_PARAMS)
            .await
    }

    /// Mempool fee histogram: fee rate (sat/vbyte) -> cumulative vsize.
    pub async fn fee_histogram(&self) -> Result<BTreeMap<u32, u64>, RpcError> {
        let pairs: Vec<(u64, u64)> = self
            .session
            .request("mempool.get_fee_histogram", NO_PARAMS)
            .await?;

        pairs
            .into_iter()
            .map(|(fee, vsize)| {
                u32::try_from(fee)
                    .map(|fee| (fee, vsize))
                    .map_err(|_| RpcError::Decode(format!("fee rate {fee} out of range")))
            })
            .collect()
    }

    /// Header at `height`. With a checkpoint, the answer also carries the
    /// merkle branch up to the checkpoint's root.
    pub async fn block_header(
        &self,
        height: u32,
        checkpoint: Option<u32>,
    ) -> Result<BlockHeader, RpcError> {
        match checkpoint {
            None => {
                let header: String = self
                    .session
                    .request("blockchain.block.header", [height])
                    .await?;
                Ok(BlockHeader {
                    header,
                    ..Default::default()
                })
            }
            Some(cp) => {
                check_checkpoint(height, cp)?;
                self.session
                    .request("blockchain.block.header", [height, cp])
                    .await
            }
        }
    }

    /// `count` consecutive headers starting at `start`.
    pub async fn block_headers(
        &self,
        start: u32,
        count: u32,
        checkpoint: Option<u32>,
    ) -> Result<BlockHeaders, RpcError> {
        match checkpoint {
            None => {
                self.session
                    .request("blockchain.block.headers", [start, count])
                    .await
            }
            Some(cp) => {
                check_checkpoint(start.saturating_add(count), cp)?;
                self.session
                    .request("blockchain.block.headers", [start, count, cp])
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_must_exceed_height() {
        assert!(check_checkpoint(123, 456).is_ok());
        assert_eq!(
            check_checkpoint(200, 100),
            Err(ValidationError::CheckpointHeight {
                highest: 200,
                checkpoint: 100
            })
        );
        assert!(check_checkpoint(200, 200).is_err());
        assert!(check_checkpoint(200, 201).is_ok());
    }
}
