//! Signal model: the immutable record every other component revolves around.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Candle timeframe a strategy is scheduled on.
///
/// Serialized as its short string form ("5m", "1h") in both log records and
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Length of one candle in minutes.
    pub fn minutes(&self) -> u64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

impl Serialize for Timeframe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What kind of trade event a signal describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    EntryLong,
    EntryShort,
    Exit,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::EntryLong => "ENTRY_LONG",
            SignalKind::EntryShort => "ENTRY_SHORT",
            SignalKind::Exit => "EXIT",
        }
    }

    /// True for either entry direction.
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalKind::EntryLong | SignalKind::EntryShort)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (strategy, timeframe) combination: the unit of independent scheduling,
/// logging and checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub strategy_id: String,
    pub timeframe: Timeframe,
}

impl Pair {
    pub fn new(strategy_id: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            timeframe,
        }
    }

    /// File stem used for this pair's log and checkpoint files.
    pub fn file_stem(&self) -> String {
        format!("{}__{}", self.strategy_id, self.timeframe)
    }

    /// Inverse of [`Pair::file_stem`]. Returns `None` for foreign files.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let (strategy, tf) = stem.rsplit_once("__")?;
        let timeframe = tf.parse().ok()?;
        Some(Self::new(strategy, timeframe))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.strategy_id, self.timeframe)
    }
}

/// Raw signal output from a strategy, before it is sequenced and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalData {
    /// Instrument symbol (e.g., "XAUUSD", "NIFTY")
    pub symbol: String,

    /// Entry/exit direction
    pub kind: SignalKind,

    /// Price at which the signal fired
    pub entry_price: Decimal,

    /// Candle close time the signal was derived from (UTC)
    pub timestamp: DateTime<Utc>,

    /// Human-readable reason from the strategy, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One durable record in a pair's signal log. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub timeframe: Timeframe,
    pub symbol: String,
    pub kind: SignalKind,
    pub entry_price: Decimal,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Gapless, strictly increasing position within this pair's log.
    /// Assigned by the store at append time.
    pub sequence: u64,

    /// Deterministic digest of the fields above; the idempotency key used
    /// when delivering this signal to the notification gateway.
    pub content_hash: String,
}

impl Signal {
    /// Build a sealed record from strategy output. Called by the log store
    /// once it has assigned a sequence number; the hash covers the sequence,
    /// so a crash-window redelivery of the same record reuses the same key.
    pub fn seal(pair: &Pair, data: SignalData, sequence: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pair.strategy_id.as_bytes());
        hasher.update(b"|");
        hasher.update(pair.timeframe.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(data.symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(data.kind.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(data.entry_price.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(data.timestamp.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(sequence.to_string().as_bytes());
        let content_hash = hex::encode(hasher.finalize());

        Self {
            strategy_id: pair.strategy_id.clone(),
            timeframe: pair.timeframe,
            symbol: data.symbol,
            kind: data.kind,
            entry_price: data.entry_price,
            timestamp: data.timestamp,
            note: data.note,
            sequence,
            content_hash,
        }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.strategy_id.clone(), self.timeframe)
    }

    /// One-line human-readable alert body sent to the gateway.
    pub fn alert_message(&self) -> String {
        let note = self
            .note
            .as_deref()
            .map(|n| format!(" ({n})"))
            .unwrap_or_default();
        format!(
            "[{}] {} {} @ {} on {}{}",
            self.pair(),
            self.kind,
            self.symbol,
            self.entry_price,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            note
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_data() -> SignalData {
        SignalData {
            symbol: "XAUUSD".to_string(),
            kind: SignalKind::EntryLong,
            entry_price: dec!(2450.25),
            timestamp: "2025-03-01T10:15:00Z".parse().unwrap(),
            note: Some("Trend changed to UP".to_string()),
        }
    }

    #[test]
    fn test_seal_is_deterministic() {
        let pair = Pair::new("supertrend_rsi", Timeframe::M15);
        let a = Signal::seal(&pair, sample_data(), 7);
        let b = Signal::seal(&pair, sample_data(), 7);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.sequence, 7);
    }

    #[test]
    fn test_hash_covers_sequence() {
        let pair = Pair::new("supertrend_rsi", Timeframe::M15);
        let a = Signal::seal(&pair, sample_data(), 1);
        let b = Signal::seal(&pair, sample_data(), 2);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_pair_file_stem_roundtrip() {
        let pair = Pair::new("ma_crossover", Timeframe::M5);
        assert_eq!(pair.file_stem(), "ma_crossover__5m");
        assert_eq!(Pair::from_file_stem("ma_crossover__5m"), Some(pair));
        assert_eq!(Pair::from_file_stem("garbage"), None);
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!(Timeframe::H4.minutes(), 240);
        assert!("90m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_signal_json_roundtrip() {
        let pair = Pair::new("straddle", Timeframe::H1);
        let signal = Signal::seal(&pair, sample_data(), 3);
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("ENTRY_LONG"));
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 3);
        assert_eq!(back.content_hash, signal.content_hash);
    }
}
