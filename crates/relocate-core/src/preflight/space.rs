//! Destination capacity check.

use crate::error::{MigrationError, Result};
use crate::remote::VolumeProbe;

/// Safety margin added on top of the measured volume total.
pub const SAFETY_MARGIN_PERCENT: u64 = 10;

/// `ceil(total * 1.10)` in integer arithmetic.
pub fn required_bytes(total: u64) -> u64 {
    let scaled = u128::from(total) * u128::from(100 + SAFETY_MARGIN_PERCENT);
    let required = scaled.div_ceil(100);
    u64::try_from(required).unwrap_or(u64::MAX)
}

/// Binary-prefixed size with two decimals, e.g. `1.50 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceCheck {
    pub total: u64,
    pub required: u64,
    pub available: u64,
}

impl SpaceCheck {
    pub fn new(total: u64, available: u64) -> Self {
        Self {
            total,
            required: required_bytes(total),
            available,
        }
    }

    /// Sum the byte size of `volumes` on the source and read free space at the
    /// target's volume root.
    pub fn measure(
        source: &VolumeProbe<'_>,
        target: &VolumeProbe<'_>,
        volumes: &[String],
    ) -> Result<Self> {
        let mut total: u64 = 0;
        for volume in volumes {
            let size = source.size_bytes(volume)?;
            tracing::debug!(volume = %volume, "Volume size: {}", format_bytes(size));
            total = total.saturating_add(size);
        }
        let available = target.available_bytes()?;
        Ok(Self::new(total, available))
    }

    pub fn passed(&self) -> bool {
        self.available >= self.required
    }

    pub fn ensure(self) -> Result<Self> {
        if self.passed() {
            tracing::info!(
                "Space check passed: need {}, {} available",
                format_bytes(self.required),
                format_bytes(self.available)
            );
            Ok(self)
        } else {
            Err(MigrationError::InsufficientSpace {
                required: self.required,
                available: self.available,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_rounds_up() {
        assert_eq!(required_bytes(0), 0);
        assert_eq!(required_bytes(1), 2);
        assert_eq!(required_bytes(10), 11);
        assert_eq!(required_bytes(1_610_612_736), 1_771_674_010);
    }

    #[test]
    fn huge_totals_saturate() {
        assert_eq!(required_bytes(u64::MAX), u64::MAX);
    }

    #[test]
    fn boundary_passes() {
        let total = 1_000_000_001;
        let check = SpaceCheck::new(total, required_bytes(total));
        assert!(check.passed());
        assert!(!SpaceCheck::new(total, required_bytes(total) - 1).passed());
    }

    #[test]
    fn formats_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1_610_612_736), "1.50 GiB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MiB");
    }
}
