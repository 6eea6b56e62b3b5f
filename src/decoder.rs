use std::collections::HashMap;

use ethers::abi::{Abi, Function, Token};
use ethers::types::{Bytes, I256};
use serde_json::{json, Map, Value};
use tracing::trace;

pub const NO_DATA: &str = "No data";

/// One way of turning calldata into something a person can read.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, data: &[u8]) -> Option<String>;
}

/// Renders calldata as a JSON call description when its selector is known.
pub struct AbiCallStrategy {
    functions: HashMap<[u8; 4], Function>,
}

impl AbiCallStrategy {
    pub fn new(abis: &[Abi]) -> Self {
        let mut functions = HashMap::new();
        for abi in abis {
            for function in abi.functions() {
                // first interface to claim a selector keeps it
                functions
                    .entry(function.short_signature())
                    .or_insert_with(|| function.clone());
            }
        }
        Self { functions }
    }
}

impl DecodeStrategy for AbiCallStrategy {
    fn name(&self) -> &'static str {
        "abi"
    }

    fn decode(&self, data: &[u8]) -> Option<String> {
        if data.len() < 4 {
            return None;
        }
        let selector: [u8; 4] = data[..4].try_into().ok()?;
        let function = self.functions.get(&selector)?;
        let tokens = function.decode_input(&data[4..]).ok()?;

        let mut args = Map::new();
        for (i, (param, token)) in function.inputs.iter().zip(tokens.iter()).enumerate() {
            let name = if param.name.is_empty() {
                format!("arg{}", i)
            } else {
                param.name.clone()
            };
            args.insert(name, render_token(token));
        }

        let inputs: Vec<String> = function.inputs.iter().map(|p| p.kind.to_string()).collect();
        let call = json!({
            "function": format!("{}({})", function.name, inputs.join(",")),
            "args": Value::Object(args),
        });
        serde_json::to_string(&call).ok()
    }
}

fn render_token(token: &Token) -> Value {
    match token {
        Token::Address(a) => Value::String(format!("{:?}", a)),
        Token::Uint(u) => Value::String(u.to_string()),
        Token::Int(i) => Value::String(I256::from_raw(*i).to_string()),
        Token::Bool(b) => Value::Bool(*b),
        Token::String(s) => Value::String(s.clone()),
        Token::Bytes(b) | Token::FixedBytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(render_token).collect())
        }
    }
}

/// Accepts the payload only when it is clean UTF-8 text.
pub struct TextStrategy;

impl DecodeStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, data: &[u8]) -> Option<String> {
        // padded payloads end in NULs
        let text = std::str::from_utf8(data).ok()?.trim_end_matches('\0');
        let clean = text
            .chars()
            .all(|c| c != char::REPLACEMENT_CHARACTER && (!c.is_control() || c.is_whitespace()));
        (clean && !text.is_empty()).then(|| text.to_string())
    }
}

/// Ordered list of strategies; the first that produces output wins.
pub struct PayloadDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl PayloadDecoder {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Structured decoding against `abis`, then plain text.
    pub fn with_interfaces(abis: &[Abi]) -> Self {
        Self::new(vec![Box::new(AbiCallStrategy::new(abis)), Box::new(TextStrategy)])
    }

    /// Never fails: unrecognised or malformed input comes back unchanged.
    pub fn decode(&self, input_hex: &str) -> String {
        let digits = input_hex
            .strip_prefix("0x")
            .or_else(|| input_hex.strip_prefix("0X"))
            .unwrap_or(input_hex);
        if digits.is_empty() {
            return NO_DATA.to_string();
        }

        match hex::decode(digits) {
            Ok(data) => self.run(&data).unwrap_or_else(|| input_hex.to_string()),
            Err(e) => {
                trace!("Payload is not hex ({}), showing raw", e);
                input_hex.to_string()
            }
        }
    }

    pub fn decode_bytes(&self, input: &Bytes) -> String {
        if input.is_empty() {
            return NO_DATA.to_string();
        }
        self.run(input).unwrap_or_else(|| input.to_string())
    }

    fn run(&self, data: &[u8]) -> Option<String> {
        self.strategies.iter().find_map(|strategy| {
            let decoded = strategy.decode(data)?;
            trace!("Payload decoded by {} strategy", strategy.name());
            Some(decoded)
        })
    }
}
