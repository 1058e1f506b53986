use allhigh_board::Port;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Upper bound on `limits.resets`; each reset re-runs the whole boot procedure.
pub const MAX_RESETS: u32 = 10_000;

fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeripheralConfig {
    pub id: String,
    pub r#type: String, // "rcc", "gpio"
    pub base_address: u64,
    #[serde(default)]
    pub size: Option<String>,
    /// RCC AHB1ENR bit that gates this peripheral's clock.
    #[serde(default)]
    pub clock_gate: Option<u32>,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChipDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub arch: String, // e.g. "cortex-m4"
    pub peripherals: Vec<PeripheralConfig>,
}

impl ChipDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open chip descriptor at {:?}", path.as_ref()))?;
        serde_yaml::from_reader(f).context("Failed to parse Chip Descriptor")
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse Chip Descriptor")
    }
}

/// Pin mask as written in a script: an integer, or a string such as
/// `"0x9FFF"`, `"0b101"`, `"all"`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MaskValue {
    Bits(u64),
    Text(String),
}

impl MaskValue {
    pub fn bits(&self) -> Result<u16> {
        let raw = match self {
            MaskValue::Bits(v) => *v,
            MaskValue::Text(s) => parse_mask(s)?,
        };
        if raw == 0 {
            anyhow::bail!("Pin mask must select at least one pin");
        }
        u16::try_from(raw).map_err(|_| anyhow::anyhow!("Pin mask {:#x} exceeds 16 pins", raw))
    }
}

fn parse_mask(text: &str) -> Result<u64> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("all") {
        return Ok(0xFFFF);
    }
    let parsed = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u64::from_str_radix(&hex.replace('_', ""), 16)
    } else if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        u64::from_str_radix(&bin.replace('_', ""), 2)
    } else {
        t.replace('_', "").parse::<u64>()
    };
    parsed.map_err(|e| anyhow::anyhow!("Invalid pin mask '{}': {}", text, e))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinSelector {
    pub port: String,
    pub mask: MaskValue,
}

impl PinSelector {
    pub fn port(&self) -> Result<Port> {
        self.port
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid port '{}': {}", self.port, e))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    /// Chip descriptor, relative to the script. Built-in STM32F407 map when absent.
    #[serde(default)]
    pub chip: Option<String>,
}

fn default_resets() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    /// Hardware resets to perform after the first power-on.
    #[serde(default = "default_resets")]
    pub resets: u32,
}

impl Default for TestLimits {
    fn default() -> Self {
        Self {
            resets: default_resets(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SysclkSource {
    Hsi,
    Hse,
    Pll,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinsHighAssertion {
    pub pins_high: PinSelector,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinsOutputAssertion {
    pub pins_output: PinSelector,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PinsUntouchedAssertion {
    pub pins_untouched: PinSelector,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeterministicAssertion {
    pub deterministic: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SysclkAssertion {
    pub sysclk_source: SysclkSource,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TestAssertion {
    PinsHigh(PinsHighAssertion),
    PinsOutput(PinsOutputAssertion),
    PinsUntouched(PinsUntouchedAssertion),
    Deterministic(DeterministicAssertion),
    SysclkSource(SysclkAssertion),
}

impl TestAssertion {
    pub fn selector(&self) -> Option<&PinSelector> {
        match self {
            TestAssertion::PinsHigh(a) => Some(&a.pins_high),
            TestAssertion::PinsOutput(a) => Some(&a.pins_output),
            TestAssertion::PinsUntouched(a) => Some(&a.pins_untouched),
            TestAssertion::Deterministic(_) | TestAssertion::SysclkSource(_) => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    #[serde(default)]
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if let Some(chip) = &self.inputs.chip {
            if chip.trim().is_empty() {
                anyhow::bail!("Input 'chip' path cannot be empty");
            }
        }

        if self.limits.resets > MAX_RESETS {
            anyhow::bail!(
                "Limit 'resets' must not exceed {} (got {})",
                MAX_RESETS,
                self.limits.resets
            );
        }

        for (i, assertion) in self.assertions.iter().enumerate() {
            if let Some(sel) = assertion.selector() {
                sel.port()
                    .with_context(|| format!("Assertion #{} has an invalid port", i))?;
                sel.mask
                    .bits()
                    .with_context(|| format!("Assertion #{} has an invalid mask", i))?;
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
