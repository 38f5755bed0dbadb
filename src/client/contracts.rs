//! Call encodings for the contracts the demo deploys and drives

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{sol, SolValue};

sol! {
    #[derive(Debug, PartialEq)]
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    #[derive(Debug, PartialEq)]
    struct OutputValidityProof {
        uint64 inputIndexWithinEpoch;
        uint64 outputIndexWithinInput;
        bytes32 outputHashesRootHash;
        bytes32 vouchersEpochRootHash;
        bytes32 noticesEpochRootHash;
        bytes32 machineStateHash;
        bytes32[] outputHashInOutputHashesSiblings;
        bytes32[] outputHashesInEpochSiblings;
    }

    #[derive(Debug, PartialEq)]
    struct Proof {
        OutputValidityProof validity;
        bytes context;
    }

    interface IInputBox {
        function addInput(address dapp, bytes calldata input) external returns (bytes32);
    }

    interface IInputBoxWrapper {
        function setYieldBridge(address yieldBridge) external;
        function addInput(address dapp, bytes calldata payload) external;
    }

    interface IYieldBridge {
        function setAssetAllocator(address token, address assetAllocator) external;
        function depositERC20Tokens(address token, address dapp, uint256 amount, bytes calldata execLayerData) external;
    }

    interface IERC20Mock {
        function setBalance(address account, uint256 amount) external;
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }

    interface IOracleMock {
        function setPrice(uint256 newPrice) external;
    }

    interface IMorpho {
        function enableIrm(address irm) external;
        function enableLltv(uint256 lltv) external;
        function setFeeRecipient(address newFeeRecipient) external;
        function createMarket(MarketParams memory marketParams) external;
        function supplyCollateral(MarketParams memory marketParams, uint256 assets, address onBehalf, bytes memory data) external;
        function borrow(MarketParams memory marketParams, uint256 assets, uint256 shares, address onBehalf, address receiver) external returns (uint256 assetsBorrowed, uint256 sharesBorrowed);
        function repay(MarketParams memory marketParams, uint256 assets, uint256 shares, address onBehalf, bytes memory data) external returns (uint256 assetsRepaid, uint256 sharesRepaid);
        function position(bytes32 id, address user) external view returns (uint256 supplyShares, uint128 borrowShares, uint128 collateral);
    }

    interface ICartesiDApp {
        function executeVoucher(address destination, bytes calldata payload, Proof calldata proof) external returns (bool);
    }
}

impl MarketParams {
    /// Morpho market id: `keccak256(abi.encode(marketParams))`.
    pub fn id(&self) -> B256 {
        keccak256(self.abi_encode())
    }
}

/// Constructor arguments, ABI-encoded for appending to creation code.
pub mod constructor {
    use super::*;

    pub fn input_box_wrapper(input_box: Address) -> Vec<u8> {
        (input_box,).abi_encode_params()
    }

    pub fn yield_bridge(input_box_wrapper: Address, dapp: Address) -> Vec<u8> {
        (input_box_wrapper, dapp).abi_encode_params()
    }

    pub fn morpho(owner: Address) -> Vec<u8> {
        (owner,).abi_encode_params()
    }

    pub fn asset_allocator(morpho: Address, market_id: B256, yield_bridge: Address) -> Vec<u8> {
        (morpho, market_id, yield_bridge).abi_encode_params()
    }
}

/// `10^18`, one whole token at 18 decimals.
pub fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;

    #[test]
    fn test_market_id_is_hash_of_static_encoding() {
        let params = MarketParams {
            loanToken: Address::repeat_byte(0x01),
            collateralToken: Address::repeat_byte(0x02),
            oracle: Address::repeat_byte(0x03),
            irm: Address::repeat_byte(0x04),
            lltv: U256::from(8u64) * U256::from(10u64).pow(U256::from(17u64)),
        };
        let encoded = params.abi_encode();
        assert_eq!(encoded.len(), 5 * 32);
        assert_eq!(params.id(), keccak256(&encoded));
    }

    #[test]
    fn test_call_selectors() {
        let call = IERC20Mock::approveCall {
            spender: Address::repeat_byte(0x01),
            amount: U256::from(1u64),
        };
        // approve(address,uint256)
        assert_eq!(&call.abi_encode()[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IMorpho::positionCall::SIGNATURE, "position(bytes32,address)");
        assert_eq!(
            ICartesiDApp::executeVoucherCall::SIGNATURE,
            "executeVoucher(address,bytes,((uint64,uint64,bytes32,bytes32,bytes32,bytes32,bytes32[],bytes32[]),bytes))"
        );
    }

    #[test]
    fn test_constructor_args_are_word_aligned() {
        assert_eq!(constructor::input_box_wrapper(Address::repeat_byte(0x01)).len(), 32);
        assert_eq!(
            constructor::asset_allocator(Address::ZERO, B256::ZERO, Address::ZERO).len(),
            96
        );
    }

    #[test]
    fn test_ether() {
        assert_eq!(ether(200).to_string(), "200000000000000000000");
    }
}
