//! VID:PID device filters
//!
//! Filter format: `0xVID:0xPID`, with `*` as a wildcard on either side
//! (e.g. `0x1234:0x5678`, `0x1234:*`, `*:*`).

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid filter format '{0}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')")]
    Format(String),

    #[error("Invalid {name} '{value}', must start with '0x' (e.g., '0x1234')")]
    MissingPrefix { name: &'static str, value: String },

    #[error("Invalid {name} '{value}', expected 1-4 hex digits")]
    BadHex { name: &'static str, value: String },
}

/// A parsed VID:PID pattern; `None` matches any value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    vendor_id: Option<u16>,
    product_id: Option<u16>,
}

impl DeviceFilter {
    pub fn new(vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }

    /// Whether a device passes a filter list; an empty list allows everything
    pub fn allows(filters: &[DeviceFilter], vendor_id: u16, product_id: u16) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(vendor_id, product_id))
    }

    /// Parse a list of filter strings, failing on the first invalid one
    pub fn parse_all<S: AsRef<str>>(filters: &[S]) -> Result<Vec<DeviceFilter>, FilterError> {
        filters.iter().map(|f| f.as_ref().parse()).collect()
    }
}

impl FromStr for DeviceFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vid, pid) = s
            .trim()
            .split_once(':')
            .filter(|(_, pid)| !pid.contains(':'))
            .ok_or_else(|| FilterError::Format(s.to_string()))?;

        Ok(Self {
            vendor_id: parse_part(vid, "VID")?,
            product_id: parse_part(pid, "PID")?,
        })
    }
}

fn parse_part(value: &str, name: &'static str) -> Result<Option<u16>, FilterError> {
    if value == "*" {
        return Ok(None);
    }

    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| FilterError::MissingPrefix {
            name,
            value: value.to_string(),
        })?;

    if hex.is_empty() || hex.len() > 4 {
        return Err(FilterError::BadHex {
            name,
            value: value.to_string(),
        });
    }

    u16::from_str_radix(hex, 16)
        .map(Some)
        .map_err(|_| FilterError::BadHex {
            name,
            value: value.to_string(),
        })
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(v) => write!(f, "0x{:04x}", v)?,
            None => write!(f, "*")?,
        }
        match self.product_id {
            Some(p) => write!(f, ":0x{:04x}", p),
            None => write!(f, ":*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(
            "0x1234:0x5678".parse(),
            Ok(DeviceFilter::new(Some(0x1234), Some(0x5678)))
        );
        assert_eq!(
            "0x1234:*".parse(),
            Ok(DeviceFilter::new(Some(0x1234), None))
        );
        assert_eq!("*:0X5678".parse(), Ok(DeviceFilter::new(None, Some(0x5678))));
        assert_eq!("*:*".parse(), Ok(DeviceFilter::new(None, None)));
        assert_eq!(
            "0xABCD:0xEF01".parse(),
            Ok(DeviceFilter::new(Some(0xabcd), Some(0xef01)))
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!("1234:5678".parse::<DeviceFilter>().is_err());
        assert!("0x1234".parse::<DeviceFilter>().is_err());
        assert!("0x1234:0x5678:0x9abc".parse::<DeviceFilter>().is_err());
        assert!("0xGHIJ:0x5678".parse::<DeviceFilter>().is_err());
        assert!("0x12345:0x5678".parse::<DeviceFilter>().is_err());
        assert!("0x:0x5678".parse::<DeviceFilter>().is_err());
    }

    #[test]
    fn test_filter_logic() {
        let filters = DeviceFilter::parse_all(&["0x1234:0x5678", "0xABCD:*"][..]).unwrap();

        assert!(DeviceFilter::allows(&filters, 0x1234, 0x5678));
        assert!(DeviceFilter::allows(&filters, 0xABCD, 0x1111));
        assert!(DeviceFilter::allows(&filters, 0xABCD, 0x9999));

        assert!(!DeviceFilter::allows(&filters, 0x1234, 0x9999));
        assert!(!DeviceFilter::allows(&filters, 0x9999, 0x5678));
        assert!(!DeviceFilter::allows(&filters, 0x0000, 0x0000));

        assert!(DeviceFilter::allows(&[], 0x1234, 0x5678));
    }

    #[test]
    fn test_display_round_trip() {
        let filter: DeviceFilter = "0xabcd:*".parse().unwrap();
        assert_eq!(filter.to_string(), "0xabcd:*");
        assert_eq!(filter.to_string().parse::<DeviceFilter>(), Ok(filter));
    }
}
