//! Escrow funds held for a consumer in the network's fee token.

use crate::chain::{ChainClient, TxReceipt};
use crate::error::{SettlementError, SettlementResult};
use crate::networks::NetworkAddresses;

fn escrow_contract(network: &NetworkAddresses) -> SettlementResult<&str> {
    network.escrow.as_deref().ok_or_else(|| {
        SettlementError::not_supported(format!("no escrow contract on {}", network.name))
    })
}

/// Funds `account` can withdraw, in base units of the fee token.
pub async fn escrow_funds(
    chain: &dyn ChainClient,
    network: &NetworkAddresses,
    account: &str,
) -> SettlementResult<u128> {
    let escrow = escrow_contract(network)?;
    chain.escrow_funds(escrow, account, &network.fee_token).await
}

/// Withdraw everything held for `account`. `Ok(None)` when there is
/// nothing to withdraw.
pub async fn withdraw_escrow_funds(
    chain: &dyn ChainClient,
    network: &NetworkAddresses,
    account: &str,
) -> SettlementResult<Option<TxReceipt>> {
    let escrow = escrow_contract(network)?;
    let funds = chain.escrow_funds(escrow, account, &network.fee_token).await?;
    if funds == 0 {
        tracing::info!("No escrow funds to withdraw for {}", account);
        return Ok(None);
    }

    tracing::info!("Withdrawing {} units of {} from escrow", funds, network.fee_token);
    let receipt = chain
        .escrow_withdraw(escrow, account, &[network.fee_token.clone()], &[funds])
        .await?;
    Ok(Some(receipt))
}
