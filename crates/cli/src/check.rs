use allhigh_board::{PinConfig, Pins, Port};
use allhigh_config::{PinSelector, TestAssertion};
use allhigh_core::peripherals::gpio::GpioPort;
use allhigh_core::Machine;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AssertionResult {
    pub assertion: TestAssertion,
    pub passed: bool,
    pub detail: String,
}

/// Pins in `mask` for which `holds` is false.
fn failing_pins(gpio: &GpioPort, mask: Pins, holds: impl Fn(&GpioPort, u8) -> bool) -> Pins {
    mask.indices()
        .filter(|&n| !holds(gpio, n))
        .fold(Pins::empty(), |acc, n| acc | Pins::pin(n))
}

fn check_pins(
    machine: &Machine,
    sel: &PinSelector,
    what: &str,
    holds: impl Fn(&GpioPort, u8) -> bool,
) -> anyhow::Result<(bool, String)> {
    let port: Port = sel.port()?;
    let mask = Pins::from_bits_retain(sel.mask.bits()?);

    let Some(gpio) = machine.bus.gpio(port) else {
        return Ok((false, format!("{} is not mapped on this chip", port)));
    };

    let failing = failing_pins(gpio, mask, holds);
    if failing.is_empty() {
        Ok((true, format!("{} {:#06x} {}", port, mask.bits(), what)))
    } else {
        Ok((
            false,
            format!(
                "{} {:#06x} not {}: {:#06x}",
                port,
                mask.bits(),
                what,
                failing.bits()
            ),
        ))
    }
}

/// Evaluate one assertion against the machine state after all reset cycles.
pub fn evaluate(
    assertion: &TestAssertion,
    machine: &Machine,
    deterministic: bool,
) -> anyhow::Result<AssertionResult> {
    let (passed, detail) = match assertion {
        TestAssertion::PinsHigh(a) => {
            check_pins(machine, &a.pins_high, "driven high", |g, n| {
                g.is_driven_high(n)
            })?
        }
        TestAssertion::PinsOutput(a) => {
            check_pins(machine, &a.pins_output, "push-pull outputs", |g, n| {
                g.pin(n).matches(&PinConfig::PUSH_PULL_OUTPUT)
            })?
        }
        TestAssertion::PinsUntouched(a) => {
            check_pins(machine, &a.pins_untouched, "at reset state", |g, n| {
                g.is_at_reset(n)
            })?
        }
        TestAssertion::Deterministic(a) => (
            a.deterministic == deterministic,
            format!(
                "expected deterministic={}, observed {}",
                a.deterministic, deterministic
            ),
        ),
        TestAssertion::SysclkSource(a) => {
            let actual = machine.bus.rcc().and_then(|rcc| rcc.sysclk_source());
            (
                actual == Some(a.sysclk_source),
                format!("expected {:?}, observed {:?}", a.sysclk_source, actual),
            )
        }
    };

    Ok(AssertionResult {
        assertion: assertion.clone(),
        passed,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::evaluate;
    use allhigh_config::{
        MaskValue, PinSelector, PinsHighAssertion, PinsUntouchedAssertion, SysclkAssertion,
        SysclkSource, TestAssertion,
    };
    use allhigh_core::Machine;

    fn selector(port: &str, mask: &str) -> PinSelector {
        PinSelector {
            port: port.to_string(),
            mask: MaskValue::Text(mask.to_string()),
        }
    }

    #[test]
    fn test_unbooted_machine_fails_pins_high() {
        let machine = Machine::new();
        let a = TestAssertion::PinsHigh(PinsHighAssertion {
            pins_high: selector("C", "all"),
        });
        let result = evaluate(&a, &machine, true).unwrap();
        assert!(!result.passed);
        assert!(result.detail.contains("0xffff"));
    }

    #[test]
    fn test_booted_machine_passes() {
        let mut machine = Machine::new();
        machine.power_on().unwrap();

        let high = TestAssertion::PinsHigh(PinsHighAssertion {
            pins_high: selector("A", "0x9FFF"),
        });
        let untouched = TestAssertion::PinsUntouched(PinsUntouchedAssertion {
            pins_untouched: selector("A", "0x6000"),
        });
        let clock = TestAssertion::SysclkSource(SysclkAssertion {
            sysclk_source: SysclkSource::Hsi,
        });
        for a in [high, untouched, clock] {
            let result = evaluate(&a, &machine, true).unwrap();
            assert!(result.passed, "{}", result.detail);
        }
    }

    #[test]
    fn test_debug_pins_never_high() {
        let mut machine = Machine::new();
        machine.power_on().unwrap();
        let a = TestAssertion::PinsHigh(PinsHighAssertion {
            pins_high: selector("gpioa", "0b0110_0000_0000_0000"),
        });
        let result = evaluate(&a, &machine, true).unwrap();
        assert!(!result.passed);
        assert!(result.detail.contains("0x6000"));
    }
}
