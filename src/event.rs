use std::str::FromStr;

/// Single polarity event from an event camera.
///
/// `timestamp` is the raw hardware counter, which wraps at the sensor's
/// maximum stamp; convert it with [`crate::TimeBase`] before doing arithmetic.
/// Layout is C-compatible so batches can be passed through the FFI unchanged.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub x: u16,
    pub y: u16,
    pub timestamp: u32,
    pub polarity: bool, // true = ON
}

impl Event {
    pub fn new(x: u16, y: u16, timestamp: u32, polarity: bool) -> Self {
        Self {
            x,
            y,
            timestamp,
            polarity,
        }
    }

    /// Signed contribution of this event: +1 for ON, -1 for OFF.
    #[inline]
    pub fn sign(&self) -> f64 {
        if self.polarity {
            1.0
        } else {
            -1.0
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pol = if self.polarity { 1 } else { -1 };
        write!(f, "{}\t{}\t{}\t{}", self.x, self.y, self.timestamp, pol)
    }
}

/// Error returned when a text line is not a valid `x y timestamp polarity` record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed event line: {0}")]
pub struct ParseEventError(pub String);

impl FromStr for Event {
    type Err = ParseEventError;

    /// Parses a whitespace-separated `x y timestamp polarity` line.
    /// Polarity accepts `1`/`-1` as well as `1`/`0`.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let err = || ParseEventError(line.to_string());
        let mut parts = line.split_whitespace();
        let x = parts.next().and_then(|v| v.parse().ok()).ok_or_else(err)?;
        let y = parts.next().and_then(|v| v.parse().ok()).ok_or_else(err)?;
        let ts = parts.next().and_then(|v| v.parse().ok()).ok_or_else(err)?;
        let pol: i8 = parts.next().and_then(|v| v.parse().ok()).ok_or_else(err)?;
        let polarity = match pol {
            1 => true,
            0 | -1 => false,
            _ => return Err(err()),
        };
        Ok(Event::new(x, y, ts, polarity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_size() {
        // 2+2+4+1 plus tail padding to the u32 alignment
        assert_eq!(std::mem::size_of::<Event>(), 12);
    }

    #[test]
    fn test_event_display() {
        let ev = Event::new(10, 20, 123456, true);
        assert_eq!(format!("{}", ev), "10\t20\t123456\t1");
        let ev = Event::new(1, 2, 3, false);
        assert_eq!(format!("{}", ev), "1\t2\t3\t-1");
    }

    #[test]
    fn test_sign() {
        assert_eq!(Event::new(0, 0, 0, true).sign(), 1.0);
        assert_eq!(Event::new(0, 0, 0, false).sign(), -1.0);
    }

    #[test]
    fn test_parse_tab_and_space() {
        let ev: Event = "3\t4\t500\t-1".parse().unwrap();
        assert_eq!(ev, Event::new(3, 4, 500, false));
        let ev: Event = "3 4 500 1".parse().unwrap();
        assert_eq!(ev, Event::new(3, 4, 500, true));
        let ev: Event = "3 4 500 0".parse().unwrap();
        assert!(!ev.polarity);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("3 4 500".parse::<Event>().is_err());
        assert!("a b c d".parse::<Event>().is_err());
        assert!("3 4 500 2".parse::<Event>().is_err());
        assert!("-3 4 500 1".parse::<Event>().is_err());
    }
}
