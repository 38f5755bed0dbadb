//! Scripted end-to-end demo on a local dev chain
//!
//! Deploys the bridge and a Morpho market, wires everything to the dapp,
//! deposits, lets the market accrue a year of interest, triggers a rebase and
//! finally withdraws through a voucher. Every step waits for the previous one.

use crate::amount::{self, Amount};
use crate::client::contracts::{
    constructor, ether, IERC20Mock, IInputBoxWrapper, IMorpho, IOracleMock, IYieldBridge, MarketParams,
};
use crate::client::{ArtifactStore, GraphQlClient, InputSender, InspectClient, RpcClient, TransactionReceipt, TransactionRequest};
use crate::config::DemoConfig;
use crate::error::{DappError, Result};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use std::time::Duration;
use tracing::info;

const ONE_YEAR_SECS: u64 = 365 * 24 * 60 * 60;

/// Everything the run deployed and observed.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub input_box_wrapper: Address,
    pub yield_bridge: Address,
    pub loan_token: Address,
    pub collateral_token: Address,
    pub morpho: Address,
    pub irm: Address,
    pub oracle: Address,
    pub market_id: B256,
    pub asset_allocator: Address,
    pub balance_after_deposit: Amount,
    pub balance_after_rebase: Amount,
    pub voucher_count: usize,
    pub executed_voucher_tx: B256,
}

pub struct Scenario {
    config: DemoConfig,
    rpc: RpcClient,
    artifacts: ArtifactStore,
    graphql: GraphQlClient,
    inspect: InspectClient,
}

impl Scenario {
    pub fn new(config: DemoConfig) -> Result<Self> {
        let rpc = RpcClient::new(&config.rpc_url)?
            .with_receipt_polling(config.receipt_poll_attempts, Duration::from_millis(500));
        let graphql = GraphQlClient::new(
            &config.graphql_url,
            Duration::from_secs(config.voucher_poll_interval_secs),
            config.voucher_poll_attempts,
        )?;
        let inspect = InspectClient::new(&config.inspect_url)?;
        let artifacts = ArtifactStore::new(&config.artifacts_dir);

        Ok(Self {
            config,
            rpc,
            artifacts,
            graphql,
            inspect,
        })
    }

    async fn deploy(&self, contract: &str, constructor_args: &[u8]) -> Result<Address> {
        info!("Deploying {}...", contract);
        let bytecode = self.artifacts.bytecode(contract)?;
        let address = self.rpc.deploy(self.config.owner, &bytecode, constructor_args).await?;
        info!(address = %address, "{} deployed", contract);
        Ok(address)
    }

    async fn send<C: SolCall>(&self, from: Address, to: Address, call: C) -> Result<TransactionReceipt> {
        self.rpc
            .transact(&TransactionRequest::call(from, to, call.abi_encode()))
            .await
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(self.config.settle_secs)).await;
    }

    async fn dapp_balance(&self, wallet: Address, token: Address) -> Result<Amount> {
        let timestamp = self.rpc.latest_block_timestamp().await?;
        self.inspect.balance(wallet, token, timestamp).await
    }

    pub async fn run(&self) -> Result<ScenarioReport> {
        let owner = self.config.owner;
        let borrower = self.config.borrower;
        let dapp = self.config.dapp;

        // Bridge contracts
        let input_box_wrapper = self
            .deploy("InputBoxWrapper", &constructor::input_box_wrapper(self.config.input_box))
            .await?;
        let yield_bridge = self
            .deploy("YieldBridge", &constructor::yield_bridge(input_box_wrapper, dapp))
            .await?;
        info!("Setting YieldBridge on InputBoxWrapper...");
        self.send(
            owner,
            input_box_wrapper,
            IInputBoxWrapper::setYieldBridgeCall { yieldBridge: yield_bridge },
        )
        .await?;

        // Lending market
        let loan_token = self.deploy("ERC20Mock", &[]).await?;
        let collateral_token = self.deploy("ERC20Mock", &[]).await?;
        let morpho = self.deploy("Morpho", &constructor::morpho(owner)).await?;
        let irm = self.deploy("IrmMock", &[]).await?;
        let oracle = self.deploy("OracleMock", &[]).await?;

        info!("Setting OracleMock price...");
        self.send(owner, oracle, IOracleMock::setPriceCall { newPrice: ether(1) * ether(1) })
            .await?;

        let lltv = ether(8) / U256::from(10u64);
        info!("Enabling IRM and LLTV on Morpho...");
        self.send(owner, morpho, IMorpho::enableIrmCall { irm: Address::ZERO }).await?;
        self.send(owner, morpho, IMorpho::enableIrmCall { irm }).await?;
        self.send(owner, morpho, IMorpho::enableLltvCall { lltv }).await?;
        self.send(owner, morpho, IMorpho::setFeeRecipientCall { newFeeRecipient: owner })
            .await?;

        let market = MarketParams {
            loanToken: loan_token,
            collateralToken: collateral_token,
            oracle,
            irm,
            lltv,
        };
        info!("Creating market on Morpho...");
        self.send(owner, morpho, IMorpho::createMarketCall { marketParams: market.clone() })
            .await?;
        let market_id = market.id();
        info!(market_id = %market_id, "Market created");

        // Allocator that parks bridged deposits in the market
        let asset_allocator = self
            .deploy(
                "AssetAllocator",
                &constructor::asset_allocator(morpho, market_id, yield_bridge),
            )
            .await?;
        self.send(
            owner,
            yield_bridge,
            IYieldBridge::setAssetAllocatorCall {
                token: loan_token,
                assetAllocator: asset_allocator,
            },
        )
        .await?;

        // Dapp wiring
        let inputs = InputSender::new(&self.rpc, owner, dapp, self.config.input_box, input_box_wrapper);
        info!("Claiming admin on the dapp...");
        inputs.claim_admin(owner).await?;
        inputs.set_input_box_wrapper(input_box_wrapper).await?;
        inputs.set_yield_bridge(yield_bridge).await?;

        // First deposit
        let deposit = ether(200);
        info!("Setting balance and approving loanToken...");
        self.send(owner, loan_token, IERC20Mock::setBalanceCall { account: owner, amount: deposit })
            .await?;
        inputs.approve_erc20(loan_token, yield_bridge, deposit).await?;
        info!("Depositing ERC20 tokens into YieldBridge...");
        self.send(
            owner,
            yield_bridge,
            IYieldBridge::depositERC20TokensCall {
                token: loan_token,
                dapp,
                amount: deposit,
                execLayerData: Bytes::new(),
            },
        )
        .await?;
        self.settle().await;

        let balance_after_deposit = self.dapp_balance(owner, loan_token).await?;
        info!(balance = %amount::format_amount(balance_after_deposit), "Dapp balance after deposit");

        // Borrow against heavy collateral and let a year of interest accrue
        info!("Simulating Morpho activity...");
        let collateral = ether(1) * U256::from(10u64).pow(U256::from(17u64));
        let borrower_inputs = InputSender::new(&self.rpc, borrower, dapp, self.config.input_box, input_box_wrapper);
        self.send(owner, collateral_token, IERC20Mock::setBalanceCall { account: borrower, amount: collateral })
            .await?;
        borrower_inputs.approve_erc20(collateral_token, morpho, collateral).await?;
        self.send(
            borrower,
            morpho,
            IMorpho::supplyCollateralCall {
                marketParams: market.clone(),
                assets: collateral,
                onBehalf: borrower,
                data: Bytes::new(),
            },
        )
        .await?;
        self.send(
            borrower,
            morpho,
            IMorpho::borrowCall {
                marketParams: market.clone(),
                assets: ether(100),
                shares: U256::ZERO,
                onBehalf: borrower,
                receiver: borrower,
            },
        )
        .await?;

        info!("Increasing time...");
        self.rpc.increase_time(ONE_YEAR_SECS).await?;

        info!("Repaying Morpho loan...");
        borrower_inputs.approve_erc20(loan_token, morpho, U256::MAX).await?;
        self.send(owner, loan_token, IERC20Mock::setBalanceCall { account: borrower, amount: ether(100_000) })
            .await?;
        let position = self.borrow_shares(morpho, market_id, borrower).await?;
        self.send(
            borrower,
            morpho,
            IMorpho::repayCall {
                marketParams: market.clone(),
                assets: U256::ZERO,
                shares: position,
                onBehalf: borrower,
                data: Bytes::new(),
            },
        )
        .await?;

        // A second deposit carries the allocator's grown balance into the dapp
        info!("Triggering token rebase...");
        self.send(owner, loan_token, IERC20Mock::setBalanceCall { account: borrower, amount: deposit })
            .await?;
        borrower_inputs.approve_erc20(loan_token, yield_bridge, deposit).await?;
        self.send(
            borrower,
            yield_bridge,
            IYieldBridge::depositERC20TokensCall {
                token: loan_token,
                dapp,
                amount: deposit,
                execLayerData: Bytes::new(),
            },
        )
        .await?;
        self.settle().await;

        let balance_after_rebase = self.dapp_balance(owner, loan_token).await?;
        info!(balance = %amount::format_amount(balance_after_rebase), "Dapp balance after rebase");

        // Withdraw everything and execute the resulting voucher
        info!("Withdrawing through the InputBoxWrapper...");
        inputs.withdraw(loan_token, balance_after_rebase, owner).await?;
        self.settle().await;

        info!("Getting and executing vouchers...");
        let vouchers = self.graphql.wait_for_vouchers().await?;
        let first = vouchers
            .first()
            .ok_or_else(|| DappError::GraphQlError("no vouchers".to_string()))?;
        let execute = first.execute_call()?;
        let receipt = self
            .rpc
            .transact(&TransactionRequest::call(owner, dapp, execute))
            .await?;
        info!(tx = %receipt.transaction_hash, "Voucher executed");

        Ok(ScenarioReport {
            input_box_wrapper,
            yield_bridge,
            loan_token,
            collateral_token,
            morpho,
            irm,
            oracle,
            market_id,
            asset_allocator,
            balance_after_deposit,
            balance_after_rebase,
            voucher_count: vouchers.len(),
            executed_voucher_tx: receipt.transaction_hash,
        })
    }

    async fn borrow_shares(&self, morpho: Address, market_id: B256, user: Address) -> Result<U256> {
        let call = IMorpho::positionCall { id: market_id, user };
        let data = self.rpc.call(morpho, call.abi_encode()).await?;
        let position = IMorpho::positionCall::abi_decode_returns(&data)?;
        Ok(U256::from(position.borrowShares))
    }
}
