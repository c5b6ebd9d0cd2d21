// src/pricing/abi.rs: Contract interfaces the on-chain price sources call

use alloy::primitives::U256;
use alloy::sol;

sol! {
    interface IAggregatorV3 {
        function decimals() external view returns (uint8);
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
    }

    interface IUniswapV2Router {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }
}

/// Lossy, which is fine for prices.
pub fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

/// `10^decimals` as a raw token amount.
pub fn one_token(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use alloy::sol_types::{SolCall, SolValue};

    #[test]
    fn test_known_selectors() {
        assert_eq!(IAggregatorV3::decimalsCall::SELECTOR, [0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(IAggregatorV3::latestRoundDataCall::SELECTOR, [0xfe, 0xaf, 0x96, 0x8c]);
        assert_eq!(IUniswapV2Router::getAmountsOutCall::SELECTOR, [0xd0, 0x6c, 0xa6, 0x1f]);
    }

    #[test]
    fn test_amounts_out_decoding() {
        let data = vec![U256::from(10u64), U256::from(2500u64)].abi_encode();
        let amounts = IUniswapV2Router::getAmountsOutCall::abi_decode_returns(&data).unwrap();
        assert_eq!(amounts, vec![U256::from(10u64), U256::from(2500u64)]);
    }

    #[test]
    fn test_garbage_offsets_are_errors() {
        assert!(IUniswapV2Router::getAmountsOutCall::abi_decode_returns(&[0xff; 64]).is_err());
        assert!(IUniswapV2Router::getAmountsOutCall::abi_decode_returns(&[0x00; 16]).is_err());
        assert!(IAggregatorV3::latestRoundDataCall::abi_decode_returns(&[0x01; 40]).is_err());
    }

    #[test]
    fn test_call_layout() {
        let call = IUniswapV2Router::getAmountsOutCall {
            amountIn: one_token(18),
            path: vec![Address::ZERO, Address::repeat_byte(0x11)],
        };
        assert_eq!(call.abi_encode().len(), 4 + 5 * 32);
    }

    #[test]
    fn test_u256_to_f64() {
        assert_eq!(u256_to_f64(U256::from(300_000_000_000u64)), 300_000_000_000.0);
        assert_eq!(u256_to_f64(one_token(6)), 1_000_000.0);
        assert!(u256_to_f64(U256::MAX) > 1e77);
    }
}
