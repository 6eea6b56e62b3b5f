use std::path::Path;

use ethers::abi::Abi;

use crate::error::ConfigError;

// Interfaces the payload decoder recognises out of the box
pub fn get_erc20_abi() -> Result<Abi, ConfigError> {
    parse_builtin("erc20", &[
        "function transfer(address to, uint256 amount) returns (bool)",
        "function approve(address spender, uint256 amount) returns (bool)",
        "function transferFrom(address from, address to, uint256 amount) returns (bool)",
    ])
}

pub fn get_dex_router_abi() -> Result<Abi, ConfigError> {
    parse_builtin("uniswap-v2-router", &[
        "function swapExactTokensForTokens(uint amountIn, uint amountOutMin, address[] path, address to, uint deadline) returns (uint[] amounts)",
        "function swapTokensForExactTokens(uint amountOut, uint amountInMax, address[] path, address to, uint deadline) returns (uint[] amounts)",
        "function swapExactETHForTokens(uint amountOutMin, address[] path, address to, uint deadline) returns (uint[] amounts)",
        "function swapExactTokensForETH(uint amountIn, uint amountOutMin, address[] path, address to, uint deadline) returns (uint[] amounts)",
        "function swapETHForExactTokens(uint amountOut, address[] path, address to, uint deadline) returns (uint[] amounts)",
        "function addLiquidity(address tokenA, address tokenB, uint amountADesired, uint amountBDesired, uint amountAMin, uint amountBMin, address to, uint deadline) returns (uint amountA, uint amountB, uint liquidity)",
        "function removeLiquidity(address tokenA, address tokenB, uint liquidity, uint amountAMin, uint amountBMin, address to, uint deadline) returns (uint amountA, uint amountB)",
    ])
}

/// Reads a standard JSON ABI, e.g. one exported from a block explorer.
pub fn load_abi_file(path: &Path) -> Result<Abi, ConfigError> {
    let abi_error = |reason: String| ConfigError::Abi {
        path: path.display().to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| abi_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| abi_error(e.to_string()))
}

/// Built-in interfaces, preceded by the user's ABI when one is configured.
pub fn known_interfaces(extra: Option<&Path>) -> Result<Vec<Abi>, ConfigError> {
    let mut abis = Vec::new();
    if let Some(path) = extra {
        abis.push(load_abi_file(path)?);
    }
    abis.push(get_erc20_abi()?);
    abis.push(get_dex_router_abi()?);
    Ok(abis)
}

fn parse_builtin(name: &str, signatures: &[&str]) -> Result<Abi, ConfigError> {
    ethers::abi::parse_abi(signatures).map_err(|e| ConfigError::Abi {
        path: format!("<builtin {}>", name),
        reason: e.to_string(),
    })
}
