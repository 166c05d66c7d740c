//! GPIO pin catalogue for the target board.
//!
//! Pins are identified by their BCM (Broadcom SoC) number. The catalogue knows
//! which identifiers are drivable and where each one sits on the 40-pin header,
//! so the web layer can show both numbers next to a motor's wiring.

use crate::motor::{PinNumber, PinRole};
use crate::store::ConfigurationDocument;
use serde::Serialize;
use std::collections::BTreeMap;

/// BCM number -> physical header pin on the 40-pin Raspberry Pi header.
const RPI_HEADER: [(PinNumber, u8); 26] = [
    (2, 3), (3, 5), (4, 7), (17, 11), (27, 13), (22, 15), (10, 19), (9, 21), (11, 23), (5, 29),
    (6, 31), (13, 33), (19, 35), (26, 37), (14, 8), (15, 10), (18, 12), (23, 16), (24, 18),
    (25, 22), (8, 24), (7, 26), (12, 32), (16, 36), (20, 38), (21, 40),
];

/// Number of BCM GPIO lines exposed by the Raspberry Pi (0..=27).
const RPI_GPIO_COUNT: PinNumber = 28;

/// Describes the drivable GPIO lines of a board.
#[derive(Debug, Clone)]
pub struct Board {
    name: String,
    gpio_count: PinNumber,
    header: BTreeMap<PinNumber, u8>,
}

/// One row of the pin usage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinUsage {
    pub bcm_pin: PinNumber,
    pub physical_pin: Option<u8>,
    pub in_use: bool,
    pub used_by: Option<String>,
}

impl Board {
    /// The Raspberry Pi BCM numbering used by the default motor wiring.
    pub fn raspberry_pi() -> Self {
        Self {
            name: "Raspberry Pi (BCM)".to_string(),
            gpio_count: RPI_GPIO_COUNT,
            header: RPI_HEADER.iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `pin` is a GPIO identifier this board can drive.
    pub fn is_valid(&self, pin: PinNumber) -> bool {
        pin < self.gpio_count
    }

    /// Physical header position of a BCM pin, when it is broken out.
    pub fn physical(&self, pin: PinNumber) -> Option<u8> {
        self.header.get(&pin).copied()
    }

    pub fn pins(&self) -> impl Iterator<Item = PinNumber> {
        0..self.gpio_count
    }

    /// Report every board pin together with the motor (if any) that owns it.
    pub fn usage(&self, doc: &ConfigurationDocument) -> Vec<PinUsage> {
        self.pins()
            .map(|pin| {
                let used_by = doc.owner_of(pin).map(|(motor, role)| match role {
                    PinRole::Step => format!("{} step", motor),
                    PinRole::Direction => format!("{} direction", motor),
                });
                PinUsage {
                    bcm_pin: pin,
                    physical_pin: self.physical(pin),
                    in_use: used_by.is_some(),
                    used_by,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        let board = Board::raspberry_pi();
        assert!(board.is_valid(0));
        assert!(board.is_valid(27));
        assert!(!board.is_valid(28));
        assert!(!board.is_valid(99));
        assert_eq!(board.pins().count(), 28);
    }

    #[test]
    fn test_physical_mapping() {
        let board = Board::raspberry_pi();
        assert_eq!(board.physical(17), Some(11));
        assert_eq!(board.physical(27), Some(13));
        assert_eq!(board.physical(22), Some(15));
        assert_eq!(board.physical(23), Some(16));
        assert_eq!(board.physical(0), None);
    }

    #[test]
    fn test_usage_report() {
        let board = Board::raspberry_pi();
        let usage = board.usage(&ConfigurationDocument::default());
        assert_eq!(usage.len(), 28);

        let pin17 = &usage[17];
        assert!(pin17.in_use);
        assert_eq!(pin17.used_by.as_deref(), Some("motor1 step"));
        assert_eq!(pin17.physical_pin, Some(11));

        let pin23 = &usage[23];
        assert_eq!(pin23.used_by.as_deref(), Some("motor2 direction"));

        let pin4 = &usage[4];
        assert!(!pin4.in_use);
        assert_eq!(pin4.used_by, None);
    }
}
