//! In-memory `ChainClient` that records every call.
//!
//! Approvals can be made to lag behind the allowance view for a number
//! of reads, mimicking an RPC node that has not caught up yet.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::chain::types::{FixedRateQuote, FreOrderParams, OrderParams, TxReceipt};
use crate::chain::ChainClient;
use crate::error::{SettlementError, SettlementResult};
use crate::provider::types::ProviderFee;

#[derive(Debug, Clone, PartialEq)]
pub enum ChainCall {
    Allowance { token: String, spender: String },
    Approve { token: String, spender: String, amount: u128 },
    BalanceOf { token: String },
    FixedRateBuyPrice { exchange_id: String },
    BuyDatatokens { exchange_id: String, amount: u128, max_base_token_amount: u128 },
    Dispense { datatoken: String, amount: u128 },
    StartOrder { datatoken: String, params: OrderParams },
    BuyFromFreAndOrder { datatoken: String, params: OrderParams, fre: FreOrderParams },
    BuyFromDispenserAndOrder { datatoken: String, params: OrderParams, dispenser: String },
    ReuseOrder { datatoken: String, order_tx_id: String, provider_fee: ProviderFee },
    EscrowFunds { token: String },
    EscrowWithdraw { tokens: Vec<String>, amounts: Vec<u128> },
}

impl ChainCall {
    pub fn method(&self) -> &'static str {
        match self {
            ChainCall::Allowance { .. } => "allowance",
            ChainCall::Approve { .. } => "approve",
            ChainCall::BalanceOf { .. } => "balanceOf",
            ChainCall::FixedRateBuyPrice { .. } => "calcBaseInGivenDatatokensOut",
            ChainCall::BuyDatatokens { .. } => "buyDatatokens",
            ChainCall::Dispense { .. } => "dispense",
            ChainCall::StartOrder { .. } => "startOrder",
            ChainCall::BuyFromFreAndOrder { .. } => "buyFromFreAndOrder",
            ChainCall::BuyFromDispenserAndOrder { .. } => "buyFromDispenserAndOrder",
            ChainCall::ReuseOrder { .. } => "reuseOrder",
            ChainCall::EscrowFunds { .. } => "getUserFunds",
            ChainCall::EscrowWithdraw { .. } => "withdraw",
        }
    }

    /// Calls that submit a transaction.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            ChainCall::Allowance { .. }
                | ChainCall::BalanceOf { .. }
                | ChainCall::FixedRateBuyPrice { .. }
                | ChainCall::EscrowFunds { .. }
        )
    }
}

type AllowanceKey = (String, String, String);

struct PendingApproval {
    amount: u128,
    reads_left: u32,
}

#[derive(Default)]
struct MockState {
    calls: Vec<ChainCall>,
    allowances: HashMap<AllowanceKey, u128>,
    pending: HashMap<AllowanceKey, PendingApproval>,
    balances: HashMap<(String, String), u128>,
    escrow: HashMap<(String, String), u128>,
    failures: HashMap<&'static str, String>,
    tx_counter: u64,
}

pub struct MockChain {
    state: Mutex<MockState>,
    quote: FixedRateQuote,
    allowance_lag: u32,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            quote: FixedRateQuote {
                base_token_amount: Decimal::ZERO,
                opc_fee_amount: Decimal::ZERO,
                market_fee_amount: Decimal::ZERO,
                consume_market_fee_amount: Decimal::ZERO,
            },
            allowance_lag: 0,
        }
    }

    pub fn with_quote(mut self, quote: FixedRateQuote) -> Self {
        self.quote = quote;
        self
    }

    /// Approvals become visible to `allowance` only after `reads` reads.
    pub fn with_allowance_lag(mut self, reads: u32) -> Self {
        self.allowance_lag = reads;
        self
    }

    /// Make every call of `method` fail with `reason`.
    pub fn failing(self, method: &'static str, reason: &str) -> Self {
        self.lock().failures.insert(method, reason.to_string());
        self
    }

    pub fn with_allowance(self, token: &str, owner: &str, spender: &str, amount: u128) -> Self {
        self.lock().allowances.insert(key(token, owner, spender), amount);
        self
    }

    pub fn with_balance(self, token: &str, account: &str, amount: u128) -> Self {
        self.lock()
            .balances
            .insert((token.to_lowercase(), account.to_lowercase()), amount);
        self
    }

    pub fn with_escrow_funds(self, token: &str, account: &str, amount: u128) -> Self {
        self.lock()
            .escrow
            .insert((token.to_lowercase(), account.to_lowercase()), amount);
        self
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<ChainCall> {
        self.calls().into_iter().filter(ChainCall::is_write).collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method() == method)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call`, apply the configured failure, and mint a receipt.
    fn submit(&self, call: ChainCall) -> SettlementResult<TxReceipt> {
        let mut state = self.lock();
        let method = call.method();
        state.calls.push(call);
        if let Some(reason) = state.failures.get(method) {
            return Err(SettlementError::Chain {
                method: method.to_string(),
                reason: reason.clone(),
                code: Some("CALL_EXCEPTION".to_string()),
                tx: None,
            });
        }
        state.tx_counter += 1;
        Ok(TxReceipt {
            transaction_hash: format!("0xtx{}", state.tx_counter),
            block_number: Some(state.tx_counter),
        })
    }

    fn read(&self, call: ChainCall) -> SettlementResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        let method = call.method();
        state.calls.push(call);
        if let Some(reason) = state.failures.get(method) {
            return Err(SettlementError::chain(method, reason.clone()));
        }
        Ok(state)
    }
}

fn key(token: &str, owner: &str, spender: &str) -> AllowanceKey {
    (token.to_lowercase(), owner.to_lowercase(), spender.to_lowercase())
}

#[async_trait]
impl ChainClient for MockChain {
    async fn allowance(&self, token: &str, owner: &str, spender: &str) -> SettlementResult<u128> {
        let mut state = self.read(ChainCall::Allowance {
            token: token.to_string(),
            spender: spender.to_string(),
        })?;
        let k = key(token, owner, spender);

        let settled = match state.pending.get_mut(&k) {
            Some(pending) if pending.reads_left > 0 => {
                pending.reads_left -= 1;
                None
            }
            Some(pending) => Some(pending.amount),
            None => None,
        };
        if let Some(amount) = settled {
            state.pending.remove(&k);
            state.allowances.insert(k.clone(), amount);
        }

        Ok(state.allowances.get(&k).copied().unwrap_or(0))
    }

    async fn approve(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> SettlementResult<TxReceipt> {
        let receipt = self.submit(ChainCall::Approve {
            token: token.to_string(),
            spender: spender.to_string(),
            amount,
        })?;
        let mut state = self.lock();
        let k = key(token, owner, spender);
        if self.allowance_lag == 0 {
            state.allowances.insert(k, amount);
        } else {
            state.pending.insert(
                k,
                PendingApproval {
                    amount,
                    reads_left: self.allowance_lag,
                },
            );
        }
        Ok(receipt)
    }

    async fn balance_of(&self, token: &str, account: &str) -> SettlementResult<u128> {
        let state = self.read(ChainCall::BalanceOf { token: token.to_string() })?;
        Ok(state
            .balances
            .get(&(token.to_lowercase(), account.to_lowercase()))
            .copied()
            .unwrap_or(0))
    }

    async fn fixed_rate_buy_price(
        &self,
        _exchange_contract: &str,
        exchange_id: &str,
        _datatoken_amount: Decimal,
        _consume_market_swap_fee: Decimal,
    ) -> SettlementResult<FixedRateQuote> {
        drop(self.read(ChainCall::FixedRateBuyPrice {
            exchange_id: exchange_id.to_string(),
        })?);
        Ok(self.quote.clone())
    }

    async fn buy_datatokens(
        &self,
        _exchange_contract: &str,
        exchange_id: &str,
        _buyer: &str,
        datatoken_amount: u128,
        max_base_token_amount: u128,
        _consume_market_fee_address: &str,
        _consume_market_swap_fee: Decimal,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::BuyDatatokens {
            exchange_id: exchange_id.to_string(),
            amount: datatoken_amount,
            max_base_token_amount,
        })
    }

    async fn dispense(
        &self,
        _dispenser: &str,
        datatoken: &str,
        amount: u128,
        _destination: &str,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::Dispense {
            datatoken: datatoken.to_string(),
            amount,
        })
    }

    async fn start_order(
        &self,
        datatoken: &str,
        _payer: &str,
        params: &OrderParams,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::StartOrder {
            datatoken: datatoken.to_string(),
            params: params.clone(),
        })
    }

    async fn buy_from_fre_and_order(
        &self,
        datatoken: &str,
        _payer: &str,
        params: &OrderParams,
        fre: &FreOrderParams,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::BuyFromFreAndOrder {
            datatoken: datatoken.to_string(),
            params: params.clone(),
            fre: fre.clone(),
        })
    }

    async fn buy_from_dispenser_and_order(
        &self,
        datatoken: &str,
        _payer: &str,
        params: &OrderParams,
        dispenser: &str,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::BuyFromDispenserAndOrder {
            datatoken: datatoken.to_string(),
            params: params.clone(),
            dispenser: dispenser.to_string(),
        })
    }

    async fn reuse_order(
        &self,
        datatoken: &str,
        _payer: &str,
        order_tx_id: &str,
        provider_fee: &ProviderFee,
    ) -> SettlementResult<TxReceipt> {
        self.submit(ChainCall::ReuseOrder {
            datatoken: datatoken.to_string(),
            order_tx_id: order_tx_id.to_string(),
            provider_fee: provider_fee.clone(),
        })
    }

    async fn escrow_funds(&self, _escrow: &str, account: &str, token: &str) -> SettlementResult<u128> {
        let state = self.read(ChainCall::EscrowFunds { token: token.to_string() })?;
        Ok(state
            .escrow
            .get(&(token.to_lowercase(), account.to_lowercase()))
            .copied()
            .unwrap_or(0))
    }

    async fn escrow_withdraw(
        &self,
        _escrow: &str,
        account: &str,
        tokens: &[String],
        amounts: &[u128],
    ) -> SettlementResult<TxReceipt> {
        let receipt = self.submit(ChainCall::EscrowWithdraw {
            tokens: tokens.to_vec(),
            amounts: amounts.to_vec(),
        })?;
        let mut state = self.lock();
        for (token, amount) in tokens.iter().zip(amounts) {
            if let Some(funds) = state.escrow.get_mut(&(token.to_lowercase(), account.to_lowercase())) {
                *funds = funds.saturating_sub(*amount);
            }
        }
        Ok(receipt)
    }
}
