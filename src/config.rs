//! A ready-made [`Rules`] implementation driven by a declarative config
//! table instead of a hand-written adapter — the shape the CLI front end
//! loads a rules file into.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::Error;
use crate::header::{self, HeaderDescriptor};
use crate::rules::{OpcodeRemap, Rules, TypeCodeRemap};

#[derive(Debug, Clone, Deserialize)]
pub struct TypeCodeRemapEntry {
    /// Replacement type code, as a single ASCII character (e.g. `"z"`).
    pub to: String,
    pub stride_override: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpcodeRemapEntry {
    /// Replacement opcode bytes, hex-encoded (e.g. `"64"`), preserving
    /// whatever width the rule author wrote.
    pub to: Option<String>,
    pub stride: Option<u8>,
}

/// Raw, serde-facing shape of a rules file: string/hex keys throughout,
/// since TOML has no notion of a raw byte map. Not `Clone` — the lazily
/// built lookup tables live behind `OnceLock`, which isn't.
#[derive(Debug, Deserialize)]
pub struct ConfigRules {
    pub compatible_versions: Option<Vec<u32>>,
    #[serde(default)]
    pub typecode_remap: HashMap<String, TypeCodeRemapEntry>,
    #[serde(default)]
    pub opcode_remap: HashMap<String, OpcodeRemapEntry>,
    pub opcode_size: Option<u8>,

    #[serde(skip)]
    typecode_table: OnceLock<HashMap<u8, TypeCodeRemap>>,
    #[serde(skip)]
    opcode_table: OnceLock<HashMap<Vec<u8>, OpcodeRemap>>,
}

impl ConfigRules {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    fn typecode_table(&self) -> &HashMap<u8, TypeCodeRemap> {
        self.typecode_table.get_or_init(|| {
            self.typecode_remap
                .iter()
                .filter_map(|(k, v)| {
                    let from = parse_byte_key(k)?;
                    let to = v.to.as_bytes().first().copied()?;
                    Some((from, TypeCodeRemap { t: to, stride_override: v.stride_override }))
                })
                .collect()
        })
    }

    fn opcode_table(&self) -> &HashMap<Vec<u8>, OpcodeRemap> {
        self.opcode_table.get_or_init(|| {
            self.opcode_remap
                .iter()
                .filter_map(|(k, v)| {
                    let from = parse_hex_bytes(k)?;
                    let to = v.to.as_deref().and_then(parse_hex_bytes);
                    Some((from, OpcodeRemap { bytes: to, stride: v.stride }))
                })
                .collect()
        })
    }
}

/// A single-character type-code key (e.g. `"z"`) or its numeric byte value
/// (e.g. `"0x7a"`, `"122"`).
fn parse_byte_key(key: &str) -> Option<u8> {
    if let Some(hex) = key.strip_prefix("0x") {
        return u8::from_str_radix(hex, 16).ok();
    }
    if key.len() == 1 {
        return key.as_bytes().first().copied();
    }
    key.parse::<u8>().ok()
}

fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("0x").unwrap_or(text);
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

impl Rules for ConfigRules {
    fn is_compatible(&self, input: &[u8]) -> bool {
        let Some(versions) = &self.compatible_versions else {
            return true;
        };
        header::parse_default(&crate::buffers::Buffers::new(input.to_vec()))
            .map(|h| versions.contains(&h.version))
            .unwrap_or(false)
    }

    fn header_parse(&self, input: &[u8], _output: &mut [u8]) -> Result<HeaderDescriptor, Error> {
        header::parse_default(&crate::buffers::Buffers::new(input.to_vec()))
    }

    fn trailer_finalize(&self, input: &[u8], _output: &[u8]) -> Result<usize, Error> {
        Ok(input.len())
    }

    fn opcode_size(&self) -> u8 {
        self.opcode_size.unwrap_or(1)
    }

    fn opcode_remap(&self) -> &HashMap<Vec<u8>, OpcodeRemap> {
        self.opcode_table()
    }

    fn typecode_remap(&self) -> &HashMap<u8, TypeCodeRemap> {
        self.typecode_table()
    }
}
